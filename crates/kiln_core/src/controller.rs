use shared::{
    config::{ControllerConfig, KilnConfig},
    protocol::PidStats,
};
use thiserror::Error;

/// The PID sum saturates at this magnitude before being scaled to a duty fraction.
const OUTPUT_SPAN: f64 = 100.0;
const MIN_DT: f64 = 1e-4;

/// Controller state carried from one tick to the next.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerMemory {
    pub previous_output: f64,
    pub integral: f64,
    pub last_error: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Regulation {
    /// Commanded duty, always within `0.0..=1.0`.
    pub heat_fraction: f64,
    pub memory: ControllerMemory,
    pub stats: PidStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("temperature {actual:.1} is above the hazard limit of {limit:.1}")]
pub struct HazardExceeded {
    pub actual: f64,
    pub limit: f64,
}

/// Windowed PID regulator with a hard hazard cutoff.
///
/// Outside `±control_window` degrees of error the output saturates at full
/// heat or no heat; inside it the PID sum is clamped to `±100` and scaled to
/// a fraction. The controller never cools, so negative outputs become zero.
#[derive(Debug, Clone)]
pub struct HeatingController {
    gains: ControllerConfig,
    hazard_temperature: f64,
}

impl HeatingController {
    pub fn new(gains: ControllerConfig, hazard_temperature: f64) -> Self {
        Self {
            gains,
            hazard_temperature,
        }
    }

    pub fn from_config(config: &KilnConfig) -> Self {
        Self::new(config.controller.clone(), config.hazard_temperature())
    }

    pub fn hazard_temperature(&self) -> f64 {
        self.hazard_temperature
    }

    /// Fails for readings above the hazard limit and for NaN readings.
    pub fn check_hazard(&self, actual: f64) -> Result<(), HazardExceeded> {
        if actual.is_nan() || actual > self.hazard_temperature {
            return Err(HazardExceeded {
                actual,
                limit: self.hazard_temperature,
            });
        }
        Ok(())
    }

    pub fn compute_output(
        &self,
        target: f64,
        actual: f64,
        memory: &ControllerMemory,
        dt: f64,
    ) -> Result<Regulation, HazardExceeded> {
        self.check_hazard(actual)?;

        let dt = dt.max(MIN_DT);
        let error = target - actual;
        let window = self.gains.control_window;
        let mut integral = memory.integral;
        let (mut p, mut d) = (0.0, 0.0);

        let raw = if error > window {
            1.0
        } else if error < -window {
            0.0
        } else {
            // f64::max drops NaN, so the upper bound is never below zero
            let limit = self.gains.integral_limit.max(0.0);
            integral = (integral + self.gains.ki * error * dt).clamp(0.0, limit);
            let derivative = memory
                .last_error
                .map(|last| (error - last) / dt)
                .unwrap_or_default();
            p = self.gains.kp * error;
            d = self.gains.kd * derivative;
            (p + integral + d).clamp(-OUTPUT_SPAN, OUTPUT_SPAN) / OUTPUT_SPAN
        };

        let mut output = raw.max(0.0);
        let step = self
            .gains
            .max_output_step
            .map(f64::abs)
            .filter(|step| step.is_finite());
        if let Some(step) = step {
            output = output.clamp(
                memory.previous_output - step,
                memory.previous_output + step,
            );
        }
        let output = output.clamp(0.0, 1.0);

        Ok(Regulation {
            heat_fraction: output,
            memory: ControllerMemory {
                previous_output: output,
                integral,
                last_error: Some(error),
            },
            stats: PidStats {
                error,
                p,
                i: integral,
                d,
                output,
            },
        })
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
