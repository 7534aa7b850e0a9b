use log::info;

/// Digital output line driving the pump relay. `true` is electrically high.
pub trait RelayOutput {
    fn set_level(&mut self, high: bool);
}

/// Sole owner of the pump relay. The relay is active-high.
pub struct ActuatorController<O> {
    output: O,
    pump_on: bool,
}

impl<O: RelayOutput> ActuatorController<O> {
    /// Takes the output and forces it low so the pump starts off.
    pub fn new(mut output: O) -> Self {
        output.set_level(false);
        Self {
            output,
            pump_on: false,
        }
    }

    pub fn set_pump(&mut self, on: bool) {
        self.pump_on = on;
        self.output.set_level(on);
        info!("pump {}", if on { "ON" } else { "OFF" });
    }

    pub fn get_pump(&self) -> bool {
        self.pump_on
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}
