use super::{load_settings_from, prepare_database_url};

use std::{collections::HashMap, fs};

use shared::{config::DriverKind, domain::TempScale};

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn defaults_apply_without_file_or_environment() {
    let settings = load_settings_from(None, HashMap::new()).expect("settings");
    assert_eq!(settings.server_bind, "0.0.0.0:8081");
    assert_eq!(settings.database_url, "sqlite://./data/kiln.db");
    assert_eq!(settings.log_filter, "info");
    assert_eq!(settings.kiln.heater_power_watts, 3850.0);
    assert_eq!(settings.kiln.hazard_temperature, None);
    assert_eq!(settings.kiln.hardware.driver, DriverKind::Bench);
}

#[test]
fn missing_config_file_is_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_from(Some(&dir.path().join("absent.toml")), HashMap::new())
        .expect("settings");
    assert_eq!(settings.kiln.kwh_rate, 0.20);
}

#[test]
fn file_values_override_defaults_and_env_overrides_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kiln.toml");
    fs::write(
        &path,
        r#"
server_bind = "127.0.0.1:9000"

[kiln]
temp_scale = "f"
kwh_rate = 0.31
currency_type = "EUR"

[kiln.controller]
kp = 2.5
"#,
    )
    .expect("write config");

    let from_file = load_settings_from(Some(&path), HashMap::new()).expect("settings");
    assert_eq!(from_file.server_bind, "127.0.0.1:9000");
    assert_eq!(from_file.kiln.temp_scale, TempScale::Fahrenheit);
    assert_eq!(from_file.kiln.kwh_rate, 0.31);
    assert_eq!(from_file.kiln.currency_type, "EUR");
    assert_eq!(from_file.kiln.controller.kp, 2.5);
    assert_eq!(from_file.kiln.controller.ki, 0.02);
    assert_eq!(from_file.kiln.hazard_temperature(), 2732.0);

    let overridden = load_settings_from(
        Some(&path),
        vars(&[
            ("APP__KILN__KWH_RATE", "0.4"),
            ("APP__SERVER_BIND", "127.0.0.1:9100"),
            ("APP__KILN__CONTROLLER__KD", "12"),
        ]),
    )
    .expect("settings");
    assert_eq!(overridden.kiln.kwh_rate, 0.4);
    assert_eq!(overridden.server_bind, "127.0.0.1:9100");
    assert_eq!(overridden.kiln.controller.kd, 12.0);
    assert_eq!(overridden.kiln.controller.kp, 2.5);
}

#[test]
fn legacy_variables_apply_below_prefixed_ones() {
    let legacy = load_settings_from(
        None,
        vars(&[
            ("SERVER_BIND", "127.0.0.1:7000"),
            ("DATABASE_URL", "sqlite://legacy.db"),
            ("PATH", "/usr/bin"),
        ]),
    )
    .expect("settings");
    assert_eq!(legacy.server_bind, "127.0.0.1:7000");
    assert_eq!(legacy.database_url, "sqlite://legacy.db");

    let prefixed = load_settings_from(
        None,
        vars(&[
            ("DATABASE_URL", "sqlite://legacy.db"),
            ("APP__DATABASE_URL", "sqlite://preferred.db"),
        ]),
    )
    .expect("settings");
    assert_eq!(prefixed.database_url, "sqlite://preferred.db");
}

#[test]
fn unusable_controller_values_are_rejected_at_load() {
    for (key, value) in [
        ("APP__KILN__CONTROLLER__MAX_OUTPUT_STEP", "-0.1"),
        ("APP__KILN__CONTROLLER__INTEGRAL_LIMIT", "-5"),
        ("APP__KILN__CONTROLLER__CONTROL_WINDOW", "-1"),
        ("APP__KILN__TICK_SECONDS", "0"),
        ("APP__KILN__SIMULATION__SPEEDUP", "-2"),
    ] {
        let error = load_settings_from(None, vars(&[(key, value)]))
            .expect_err("settings should be rejected");
        assert!(
            format!("{error:#}").contains("invalid kiln settings"),
            "{key}: {error:#}"
        );
    }
}

#[test]
fn kill_switch_path_is_optional() {
    let settings = load_settings_from(None, HashMap::new()).expect("settings");
    assert_eq!(settings.kiln.hardware.kill_switch_path, None);

    let configured = load_settings_from(
        None,
        vars(&[("APP__KILN__HARDWARE__KILL_SWITCH_PATH", "/sys/class/gpio/gpio24/value")]),
    )
    .expect("settings");
    assert_eq!(
        configured.kiln.hardware.kill_switch_path.as_deref(),
        Some("/sys/class/gpio/gpio24/value")
    );
}

#[test]
fn plain_paths_become_sqlite_urls() {
    assert_eq!(prepare_database_url("./data/test.db"), "sqlite://./data/test.db");
    assert_eq!(prepare_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(prepare_database_url("  "), "sqlite://./data/kiln.db");
    assert_eq!(
        prepare_database_url("C:\\kiln\\kiln.db"),
        "sqlite://C:/kiln/kiln.db"
    );
}
