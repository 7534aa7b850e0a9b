use log::{info, warn};

use crate::types::Thresholds;

/// Holds the humidity band pushed by the server. Advisory only: nothing in
/// the device switches the pump from these values.
#[derive(Debug, Clone, Default)]
pub struct ThresholdStore {
    current: Thresholds,
}

impl ThresholdStore {
    pub fn new(initial: Thresholds) -> Self {
        Self { current: initial }
    }

    pub fn set_thresholds(&mut self, min_humidity: i32, max_humidity: i32) {
        self.current = Thresholds {
            min_humidity,
            max_humidity,
        };

        info!("thresholds updated: min={min_humidity}, max={max_humidity}");
        if !self.current.is_ordered() {
            warn!("threshold min {min_humidity} is above max {max_humidity}; storing as received");
        }
    }

    pub fn get_thresholds(&self) -> (i32, i32) {
        (self.current.min_humidity, self.current.max_humidity)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_twenty_forty() {
        assert_eq!(ThresholdStore::default().get_thresholds(), (20, 40));
    }

    #[test]
    fn stores_values_without_validation() {
        let mut store = ThresholdStore::new(Thresholds::default());

        store.set_thresholds(20, 40);
        assert_eq!(store.get_thresholds(), (20, 40));

        store.set_thresholds(90, 10);
        assert_eq!(store.get_thresholds(), (90, 10));
        assert!(!store.thresholds().is_ordered());

        store.set_thresholds(-5, 250);
        assert_eq!(store.get_thresholds(), (-5, 250));
    }
}
