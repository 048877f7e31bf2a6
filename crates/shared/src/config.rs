//! Process-wide kiln settings, loaded once at startup and read-only afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    domain::{TempScale, TimeScale},
    protocol::ConfigSnapshot,
};

/// Hazard ceiling used when none is configured, in degrees Celsius.
pub const DEFAULT_HAZARD_CELSIUS: f64 = 1500.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    pub temp_scale: TempScale,
    pub time_scale_profile: TimeScale,
    pub time_scale_slope: TimeScale,
    pub kwh_rate: f64,
    pub currency_type: String,
    pub heater_power_watts: f64,
    /// Overrides the 1500 °C default, expressed in `temp_scale`.
    pub hazard_temperature: Option<f64>,
    pub tick_seconds: f64,
    pub thermocouple_offset: f64,
    pub controller: ControllerConfig,
    pub catch_up: CatchUpConfig,
    pub simulation: SimulationConfig,
    pub hardware: HardwareConfig,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            temp_scale: TempScale::Celsius,
            time_scale_profile: TimeScale::Minutes,
            time_scale_slope: TimeScale::Hours,
            kwh_rate: 0.20,
            currency_type: "$".into(),
            heater_power_watts: 3850.0,
            hazard_temperature: None,
            tick_seconds: 1.0,
            thermocouple_offset: 0.0,
            controller: ControllerConfig::default(),
            catch_up: CatchUpConfig::default(),
            simulation: SimulationConfig::default(),
            hardware: HardwareConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite number >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be a finite number > 0, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

impl KilnConfig {
    /// Rejects values the control loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let controller = &self.controller;
        finite("controller.kp", controller.kp)?;
        finite("controller.ki", controller.ki)?;
        finite("controller.kd", controller.kd)?;
        non_negative("controller.control_window", controller.control_window)?;
        non_negative("controller.integral_limit", controller.integral_limit)?;
        if let Some(step) = controller.max_output_step {
            non_negative("controller.max_output_step", step)?;
        }
        positive("tick_seconds", self.tick_seconds)?;
        positive("simulation.speedup", self.simulation.speedup)?;
        non_negative("heater_power_watts", self.heater_power_watts)?;
        non_negative("kwh_rate", self.kwh_rate)?;
        non_negative("catch_up.pause_window", self.catch_up.pause_window)?;
        finite("thermocouple_offset", self.thermocouple_offset)?;
        if let Some(hazard) = self.hazard_temperature {
            finite("hazard_temperature", hazard)?;
        }
        Ok(())
    }

    pub fn hazard_temperature(&self) -> f64 {
        self.hazard_temperature
            .unwrap_or_else(|| self.temp_scale.from_celsius(DEFAULT_HAZARD_CELSIUS))
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            temp_scale: self.temp_scale,
            time_scale_slope: self.time_scale_slope,
            time_scale_profile: self.time_scale_profile,
            kwh_rate: self.kwh_rate,
            currency_type: self.currency_type.clone(),
            kp: self.controller.kp,
            ki: self.controller.ki,
            kd: self.controller.kd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Degrees of error beyond which the output saturates at 0 or 1.
    pub control_window: f64,
    pub integral_limit: f64,
    /// Largest allowed change of heat fraction between two ticks.
    pub max_output_step: Option<f64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.02,
            kd: 30.0,
            control_window: 10.0,
            integral_limit: 100.0,
            max_output_step: Some(0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchUpConfig {
    pub enabled: bool,
    pub pause_window: f64,
}

impl Default for CatchUpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pause_window: 50.0,
        }
    }
}

/// Lumped thermal model parameters used by SIMULATE runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub room_temperature: f64,
    /// J/K
    pub element_heat_capacity: f64,
    /// J/K
    pub oven_heat_capacity: f64,
    /// W
    pub heating_power: f64,
    /// K/W
    pub thermal_res_oven_to_environ: f64,
    /// K/W
    pub thermal_res_element_to_oven: f64,
    /// Simulated seconds per wall-clock second.
    pub speedup: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            room_temperature: 20.0,
            element_heat_capacity: 200.0,
            oven_heat_capacity: 1000.0,
            heating_power: 1450.0,
            thermal_res_oven_to_environ: 1.2,
            thermal_res_element_to_oven: 0.08,
            speedup: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// In-process thermal model behind the sensor and heater traits.
    #[default]
    Bench,
    /// hwmon thermocouple input plus a sysfs GPIO relay.
    Linux,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub driver: DriverKind,
    /// hwmon `temp*_input` file reporting millidegrees Celsius.
    pub sensor_path: String,
    /// sysfs GPIO `value` file driving the heater relay.
    pub heater_path: String,
    /// Optional sysfs GPIO `value` file driven high to trip a backup
    /// contactor when a run aborts on the hazard limit.
    pub kill_switch_path: Option<String>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Bench,
            sensor_path: "/sys/class/hwmon/hwmon0/temp1_input".into(),
            heater_path: "/sys/class/gpio/gpio23/value".into(),
            kill_switch_path: None,
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
