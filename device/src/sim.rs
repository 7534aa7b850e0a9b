use std::{cell::Cell, rc::Rc};

use humidity_common::{AnalogInput, RelayOutput};

const RAW_CEILING: i32 = 4095;
const DRYING_PER_READ: i32 = 12;
const WETTING_PER_READ: i32 = 40;

/// Relay stand-in whose level the simulated soil can observe.
pub struct SimulatedRelay {
    level: Rc<Cell<bool>>,
}

impl RelayOutput for SimulatedRelay {
    fn set_level(&mut self, high: bool) {
        self.level.set(high);
    }
}

/// Soil probe that slowly dries out and gets wetter while the pump runs.
pub struct SimulatedSoil {
    raw: i32,
    tick: u64,
    pump: Rc<Cell<bool>>,
}

impl AnalogInput for SimulatedSoil {
    fn read_raw(&mut self) -> i32 {
        self.tick = self.tick.wrapping_add(1);

        let delta = if self.pump.get() {
            WETTING_PER_READ
        } else {
            -DRYING_PER_READ
        };
        self.raw = (self.raw + delta).clamp(0, RAW_CEILING);

        let ripple = (self.tick % 8) as i32 * 6;
        (self.raw + ripple).min(RAW_CEILING)
    }
}

pub fn soil_with_relay(initial_raw: i32) -> (SimulatedSoil, SimulatedRelay) {
    let level = Rc::new(Cell::new(false));
    let soil = SimulatedSoil {
        raw: initial_raw.clamp(0, RAW_CEILING),
        tick: 0,
        pump: Rc::clone(&level),
    };
    (soil, SimulatedRelay { level })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soil_dries_while_pump_is_off() {
        let (mut soil, _relay) = soil_with_relay(2000);

        let first = soil.read_raw();
        for _ in 0..15 {
            soil.read_raw();
        }

        assert!(soil.read_raw() < first);
    }

    #[test]
    fn relay_level_makes_soil_wetter() {
        let (mut soil, mut relay) = soil_with_relay(2000);
        relay.set_level(true);

        let first = soil.read_raw();
        for _ in 0..15 {
            soil.read_raw();
        }

        assert!(soil.read_raw() > first);
    }

    #[test]
    fn readings_stay_in_adc_range() {
        let (mut soil, mut relay) = soil_with_relay(4090);
        relay.set_level(true);
        for _ in 0..200 {
            assert!((0..=RAW_CEILING).contains(&soil.read_raw()));
        }

        relay.set_level(false);
        for _ in 0..1_000 {
            assert!((0..=RAW_CEILING).contains(&soil.read_raw()));
        }
    }
}
