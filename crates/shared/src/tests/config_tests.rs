use super::*;

#[test]
fn defaults_are_valid() {
    assert_eq!(KilnConfig::default().validate(), Ok(()));
}

#[test]
fn negative_or_nan_output_step_is_rejected() {
    let mut config = KilnConfig::default();
    config.controller.max_output_step = Some(-0.1);
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Negative { field: "controller.max_output_step", .. })
    ));

    config.controller.max_output_step = Some(f64::NAN);
    assert!(config.validate().is_err());

    config.controller.max_output_step = None;
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn controller_bounds_must_be_non_negative() {
    let mut config = KilnConfig::default();
    config.controller.integral_limit = -1.0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Negative { field: "controller.integral_limit", .. })
    ));

    let mut config = KilnConfig::default();
    config.controller.control_window = f64::INFINITY;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Negative { field: "controller.control_window", .. })
    ));
}

#[test]
fn tick_and_speedup_must_be_positive() {
    let mut config = KilnConfig::default();
    config.tick_seconds = 0.0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::NotPositive { field: "tick_seconds", .. })
    ));

    let mut config = KilnConfig::default();
    config.simulation.speedup = f64::INFINITY;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::NotPositive { field: "simulation.speedup", .. })
    ));
}

#[test]
fn fahrenheit_hazard_default_is_converted() {
    let config = KilnConfig {
        temp_scale: TempScale::Fahrenheit,
        ..KilnConfig::default()
    };
    assert_eq!(config.hazard_temperature(), 2732.0);
}
