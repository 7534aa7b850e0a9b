use log::trace;

use crate::config::SensorCalibration;

pub const HUMIDITY_MIN: i32 = 1;
pub const HUMIDITY_MAX: i32 = 100;

/// Raw analog sample source (one ADC channel).
pub trait AnalogInput {
    fn read_raw(&mut self) -> i32;
}

/// Linear remap of `raw` from the calibrated range into 1..=100, clamped.
///
/// Integer arithmetic truncates toward zero. An inverted calibration
/// (`raw_min > raw_max`) yields a non-increasing mapping.
pub fn raw_to_humidity(raw: i32, calibration: SensorCalibration) -> i32 {
    let span_in = i64::from(calibration.raw_max) - i64::from(calibration.raw_min);
    if span_in == 0 {
        return HUMIDITY_MIN;
    }

    let span_out = i64::from(HUMIDITY_MAX - HUMIDITY_MIN);
    let mapped = (i64::from(raw) - i64::from(calibration.raw_min)) * span_out / span_in
        + i64::from(HUMIDITY_MIN);

    mapped.clamp(i64::from(HUMIDITY_MIN), i64::from(HUMIDITY_MAX)) as i32
}

pub struct SensorReader<A> {
    input: A,
    calibration: SensorCalibration,
}

impl<A: AnalogInput> SensorReader<A> {
    pub fn new(input: A, calibration: SensorCalibration) -> Self {
        Self { input, calibration }
    }

    pub fn read_humidity(&mut self) -> i32 {
        let raw = self.input.read_raw();
        let humidity = raw_to_humidity(raw, self.calibration);
        trace!("humidity sample raw={raw} -> {humidity}%");
        humidity
    }

    pub fn input(&self) -> &A {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut A {
        &mut self.input
    }
}
