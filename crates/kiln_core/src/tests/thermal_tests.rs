use super::*;

#[test]
fn starts_at_room_temperature_and_stays_there_unheated() {
    let mut kiln = SimulatedKiln::new(SimulationConfig::default());
    assert_eq!(kiln.temperature(), 20.0);
    kiln.advance(0.0, 600.0);
    assert!((kiln.temperature() - 20.0).abs() < 1e-9);
    assert!((kiln.element_temperature() - 20.0).abs() < 1e-9);
}

#[test]
fn full_power_heats_the_chamber_and_element_leads() {
    let mut kiln = SimulatedKiln::new(SimulationConfig::default());
    kiln.advance(1.0, 300.0);
    assert!(kiln.temperature() > 100.0, "chamber at {}", kiln.temperature());
    assert!(kiln.element_temperature() > kiln.temperature());
}

#[test]
fn cools_back_towards_the_room() {
    let mut kiln = SimulatedKiln::new(SimulationConfig::default());
    kiln.advance(1.0, 600.0);
    let hot = kiln.temperature();
    kiln.advance(0.0, 600.0);
    let cooler = kiln.temperature();
    assert!(cooler < hot);
    assert!(cooler > 20.0);
}

#[test]
fn long_steps_match_many_short_ones() {
    let mut coarse = SimulatedKiln::new(SimulationConfig::default());
    let mut fine = SimulatedKiln::new(SimulationConfig::default());
    coarse.advance(0.6, 120.0);
    for _ in 0..120 {
        fine.advance(0.6, 1.0);
    }
    assert!((coarse.temperature() - fine.temperature()).abs() < 1e-6);
}
