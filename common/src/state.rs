use crate::{
    actuator::{ActuatorController, RelayOutput},
    thresholds::ThresholdStore,
    types::{DeviceSnapshot, Thresholds},
};

/// All mutable device state, owned by the control loop.
pub struct DeviceState<O> {
    actuator: ActuatorController<O>,
    thresholds: ThresholdStore,
}

impl<O: RelayOutput> DeviceState<O> {
    pub fn new(relay: O, initial_thresholds: Thresholds) -> Self {
        Self {
            actuator: ActuatorController::new(relay),
            thresholds: ThresholdStore::new(initial_thresholds),
        }
    }

    pub fn actuator(&self) -> &ActuatorController<O> {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut ActuatorController<O> {
        &mut self.actuator
    }

    pub fn thresholds(&self) -> &ThresholdStore {
        &self.thresholds
    }

    pub fn thresholds_mut(&mut self) -> &mut ThresholdStore {
        &mut self.thresholds
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let (min_humidity, max_humidity) = self.thresholds.get_thresholds();
        DeviceSnapshot {
            pump_on: self.actuator.get_pump(),
            min_humidity,
            max_humidity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRelay;

    #[test]
    fn snapshot_reflects_pump_and_thresholds() {
        let mut state = DeviceState::new(
            RecordingRelay::default(),
            Thresholds {
                min_humidity: 25,
                max_humidity: 65,
            },
        );
        state.actuator_mut().set_pump(true);

        assert_eq!(
            state.snapshot(),
            DeviceSnapshot {
                pump_on: true,
                min_humidity: 25,
                max_humidity: 65
            }
        );
    }
}
