//! End-to-end validation of composed and deserialized stimulation commands.

use bicstim_core::{
    validate, CommandValidator, ElectrodeConstraintError, GridPolicy, PulseLimits,
    PulseShapeError, Rejection, StimulationAtom, StimulationCommand, StimulationFunction,
    StructuralError,
};

/// Build a single-function pulse command from (amplitude µA, duration µs) pairs.
fn pulse_command(atoms: &[(i32, u64)]) -> StimulationCommand {
    let mut function = StimulationFunction::new("PulseExample");
    for &(amplitude_ua, duration_us) in atoms {
        function.append(StimulationAtom::rect4(amplitude_ua, duration_us)).unwrap();
    }
    function.set_repetitions(10).unwrap();
    function.set_virtual_electrodes([0], [1], false).unwrap();

    let mut command = StimulationCommand::new("scenario");
    command.set_tracing_id(7);
    command.append(function).unwrap();
    command
}

fn balanced_pulse(main_ua: i32, main_us: u64, dead_zone_us: u64, pause_us: u64) -> StimulationCommand {
    pulse_command(&[
        (main_ua, main_us),
        (0, dead_zone_us),
        (-main_ua / 4, main_us * 4),
        (0, dead_zone_us),
        (0, pause_us),
    ])
}

fn range_only() -> CommandValidator {
    CommandValidator::new(PulseLimits::BIC3232.with_grid(GridPolicy::RangeOnly))
}

#[test]
fn scenario_reference_pulse_accepted_when_grid_not_enforced() {
    let command = pulse_command(&[(-1000, 400), (0, 1600), (250, 1600), (0, 1600), (0, 2550)]);

    let result = range_only().validate(&command);
    assert!(result.valid, "{}", result.reason);
    assert_eq!(result.reason, "");

    // -1000 µA is between the 12 µA steps -996 and -1008
    let strict = validate(&command);
    assert!(!strict.valid);
    assert!(strict.reason.contains("not a multiple of 12"), "{}", strict.reason);
}

#[test]
fn scenario_counter_amplitude_mismatch_when_grid_not_enforced() {
    let command = pulse_command(&[(-1000, 400), (0, 1600), (260, 1600), (0, 1600), (0, 2550)]);

    let result = range_only().validate(&command);
    assert!(!result.valid);
    assert!(result.reason.contains("counter-pulse ratio mismatch"), "{}", result.reason);
    assert!(matches!(
        range_only().check(&command),
        Err(Rejection::PulseShape(PulseShapeError::CounterAmplitudeMismatch {
            main_ua: -1000,
            counter_ua: 260,
            ratio: 4,
            ..
        }))
    ));
}

#[test]
fn scenario_short_pulse_is_structural() {
    let command = pulse_command(&[(-1200, 400), (0, 100), (300, 1600)]);

    let result = validate(&command);
    assert!(!result.valid);
    assert!(matches!(
        CommandValidator::default().check(&command),
        Err(Rejection::Structural(StructuralError::WrongAtomCount {
            expected: 5,
            actual: 3,
            ..
        }))
    ));
}

#[test]
fn scenario_electrode_overlap() {
    // Overlapping sets cannot be composed, so the command arrives from a file
    let json = r#"{
        "name": "overlap",
        "functions": [{
            "name": "pause",
            "atoms": [{ "type": "pause", "duration_us": 30000 }],
            "electrodes": { "sources": [0], "destinations": [0] }
        }]
    }"#;
    let command: StimulationCommand = serde_json::from_str(json).unwrap();

    let result = validate(&command);
    assert!(!result.valid);
    assert!(result.reason.contains("electrode overlap"), "{}", result.reason);
    assert!(matches!(
        CommandValidator::default().check(&command),
        Err(Rejection::Electrode(ElectrodeConstraintError::Overlap { electrode: 0, .. }))
    ));
}

#[test]
fn scenario_boundary_pulse_is_inclusive() {
    let command = balanced_pulse(-6120, 2550, 2550, 20_400);
    let result = validate(&command);
    assert!(result.valid, "{}", result.reason);

    let shortest = balanced_pulse(0, 10, 10, 10);
    assert!(validate(&shortest).valid);
}

#[test]
fn every_on_grid_main_amplitude_is_accepted() {
    let limits = PulseLimits::BIC3232;
    let validator = CommandValidator::new(limits);

    for amplitude_ua in (-6120..=0).filter(|&a| limits.main_amplitude_on_grid(a)) {
        let command = balanced_pulse(amplitude_ua, 400, 100, 800);
        let result = validator.validate(&command);
        assert!(result.valid, "{amplitude_ua}µA: {}", result.reason);
    }
}

#[test]
fn every_off_grid_main_amplitude_is_rejected() {
    let validator = CommandValidator::default();

    for amplitude_ua in [-6121, -6119, -6108, -3084, -3061, -1000, -13, -1, 1] {
        let command = pulse_command(&[
            (amplitude_ua, 400),
            (0, 100),
            (0, 1600),
            (0, 100),
            (0, 800),
        ]);
        let rejection = validator.check(&command).unwrap_err();
        assert!(
            matches!(
                rejection,
                Rejection::PulseShape(
                    PulseShapeError::AmplitudeOffGrid { .. }
                        | PulseShapeError::AmplitudeOutOfRange { .. }
                )
            ),
            "{amplitude_ua}µA: {rejection}"
        );
    }
}

#[test]
fn every_main_duration_on_the_10us_grid_is_accepted() {
    for main_us in (10..=2550).step_by(10) {
        let command = balanced_pulse(-1200, main_us, 100, 800);
        assert!(validate(&command).valid, "{main_us}µs");
    }
}

#[test]
fn counter_ratio_has_no_tolerance() {
    for counter_ua in [299, 301, -300, 0] {
        let command = pulse_command(&[
            (-1200, 400),
            (0, 100),
            (counter_ua, 1600),
            (0, 100),
            (0, 800),
        ]);
        let result = validate(&command);
        assert!(!result.valid, "{counter_ua}µA");
        assert!(result.reason.contains("counter-pulse ratio mismatch"));
        assert!(result.reason.starts_with("atom 3 (counter pulse)"), "{}", result.reason);
    }
}

/// Single pause function with the given electrode JSON.
fn pause_with_electrodes(electrodes: serde_json::Value) -> StimulationCommand {
    serde_json::from_value(serde_json::json!({
        "name": "electrodes",
        "functions": [{
            "name": "x",
            "atoms": [{ "type": "pause", "duration_us": 30000 }],
            "electrodes": electrodes
        }]
    }))
    .unwrap()
}

#[test]
fn empty_source_set_is_rejected() {
    let command = pause_with_electrodes(serde_json::json!({
        "sources": [],
        "destinations": [1],
        "use_ground": true
    }));
    assert!(matches!(
        CommandValidator::default().check(&command),
        Err(Rejection::Electrode(ElectrodeConstraintError::EmptySource { .. }))
    ));
    assert!(!validate(&command).valid);
}

#[test]
fn empty_destination_set_needs_ground() {
    let command = pause_with_electrodes(serde_json::json!({
        "sources": [0],
        "destinations": []
    }));
    assert!(matches!(
        CommandValidator::default().check(&command),
        Err(Rejection::Electrode(ElectrodeConstraintError::EmptyDestination { .. }))
    ));
    assert!(validate(&command).reason.contains("function x"));

    let to_ground = pause_with_electrodes(serde_json::json!({
        "sources": [0],
        "destinations": [],
        "use_ground": true
    }));
    assert!(validate(&to_ground).valid);
}

#[test]
fn overlap_rejects_regardless_of_pulse_shape() {
    let template = serde_json::to_value(balanced_pulse(-1200, 400, 100, 800)).unwrap();

    for electrode in [0u32, 5, 31] {
        let mut value = template.clone();
        value["functions"][0]["electrodes"] = serde_json::json!({
            "sources": [electrode, 40],
            "destinations": [electrode],
            "use_ground": true
        });
        let command: StimulationCommand = serde_json::from_value(value).unwrap();
        assert!(matches!(
            CommandValidator::default().check(&command),
            Err(Rejection::Electrode(ElectrodeConstraintError::Overlap { .. }))
        ));
    }
}

#[test]
fn mixed_and_untyped_atoms_are_structural() {
    let json = r#"{
        "functions": [{
            "name": "mixed",
            "atoms": [
                { "type": "pause", "duration_us": 100 },
                { "type": "rectangular4", "amplitudes_ua": [0, 0, 0, 0], "duration_us": 100 }
            ],
            "electrodes": { "sources": [0], "destinations": [1] }
        }]
    }"#;
    let command: StimulationCommand = serde_json::from_str(json).unwrap();
    assert_eq!(validate(&command).reason, "mixed atom types in function mixed");

    let json = r#"{
        "functions": [{
            "atoms": [{ "type": "no_type" }],
            "electrodes": { "sources": [0], "destinations": [1] }
        }]
    }"#;
    let command: StimulationCommand = serde_json::from_str(json).unwrap();
    assert!(matches!(
        CommandValidator::default().check(&command),
        Err(Rejection::Structural(StructuralError::UntypedAtom { atom: 1, .. }))
    ));
    assert!(validate(&command).reason.contains("function #0"));
}

#[test]
fn zero_repetitions_from_file_are_structural() {
    let json = r#"{
        "repetitions": 0,
        "functions": [{
            "atoms": [{ "type": "pause", "duration_us": 100 }],
            "electrodes": { "sources": [0], "destinations": [1] }
        }]
    }"#;
    let command: StimulationCommand = serde_json::from_str(json).unwrap();
    assert!(matches!(
        CommandValidator::default().check(&command),
        Err(Rejection::Structural(StructuralError::ZeroCommandRepetitions))
    ));
}

#[test]
fn validator_is_shareable_across_threads() {
    let validator = CommandValidator::default();
    let command = balanced_pulse(-3072, 250, 50, 160);
    let expected = validator.validate(&command);
    assert!(expected.valid, "{}", expected.reason);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    assert_eq!(validator.validate(&command), expected);
                }
            });
        }
    });
}
