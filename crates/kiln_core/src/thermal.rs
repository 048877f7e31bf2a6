//! Lumped two-body model of a kiln: the heating element warms the chamber,
//! the chamber loses heat to the room.

use shared::config::SimulationConfig;

/// Explicit Euler is stable for the default element time constant at this step.
const MAX_STEP_SECONDS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct SimulatedKiln {
    params: SimulationConfig,
    element_temperature: f64,
    chamber_temperature: f64,
}

impl SimulatedKiln {
    pub fn new(params: SimulationConfig) -> Self {
        let room = params.room_temperature;
        Self {
            params,
            element_temperature: room,
            chamber_temperature: room,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.chamber_temperature
    }

    pub fn element_temperature(&self) -> f64 {
        self.element_temperature
    }

    /// Integrates `seconds` of operation with the element at `heat_fraction` duty.
    pub fn advance(&mut self, heat_fraction: f64, seconds: f64) {
        let heat_fraction = heat_fraction.clamp(0.0, 1.0);
        let mut remaining = seconds.max(0.0);
        while remaining > 0.0 {
            let step = remaining.min(MAX_STEP_SECONDS);
            self.step(heat_fraction, step);
            remaining -= step;
        }
    }

    fn step(&mut self, heat_fraction: f64, h: f64) {
        let p = &self.params;
        self.element_temperature += p.heating_power * heat_fraction * h / p.element_heat_capacity;

        let element_to_chamber =
            (self.element_temperature - self.chamber_temperature) / p.thermal_res_element_to_oven;
        self.chamber_temperature += element_to_chamber * h / p.oven_heat_capacity;
        self.element_temperature -= element_to_chamber * h / p.element_heat_capacity;

        let chamber_to_room =
            (self.chamber_temperature - p.room_temperature) / p.thermal_res_oven_to_environ;
        self.chamber_temperature -= chamber_to_room * h / p.oven_heat_capacity;
    }
}

#[cfg(test)]
#[path = "tests/thermal_tests.rs"]
mod tests;
