//! Client-side validation of stimulation commands.
//!
//! [`CommandValidator`] checks a fully composed [`StimulationCommand`] against
//! [`PulseLimits`] before it is handed to the implant driver. The driver
//! runs its own validation and has the final word; this check only catches
//! malformed commands before a round trip to hardware.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. The command has functions and at least one repetition
//! 2. Each function is non-empty, repeats at least once, and holds atoms of
//!    a single, typed kind
//! 3. Electrode sets are non-empty, disjoint and within the channel count
//! 4. Rectangular-4 functions form a valid five-atom pulse; pause functions
//!    hold exactly one pause atom
//!
//! Validation never panics and never mutates its input. The validator holds
//! only immutable limits, so it can be shared across threads.
//!
//! # Example
//!
//! ```rust
//! use bicstim_core::types::{StimulationAtom, StimulationCommand, StimulationFunction};
//! use bicstim_core::validate::validate;
//!
//! let mut pause = StimulationFunction::new("pause");
//! pause.append(StimulationAtom::pause(30_000)).unwrap();
//! pause.set_virtual_electrodes([0], [1], false).unwrap();
//!
//! let mut command = StimulationCommand::new("only-pause");
//! command.append(pause).unwrap();
//!
//! let result = validate(&command);
//! assert!(result.valid);
//! assert!(result.reason.is_empty());
//! ```

use alloc::string::{String, ToString};

use serde::{Deserialize, Serialize};

use crate::error::{
    ElectrodeConstraintError, FunctionPattern, FunctionRef, PulseShapeError, Rejection,
    StructuralError,
};
use crate::limits::PulseLimits;
use crate::types::{AtomType, PulseRole, StimulationAtom, StimulationCommand, StimulationFunction};

/// Outcome of validating a command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// True if the command passed every check
    pub valid: bool,
    /// Rejection reason, empty when valid
    pub reason: String,
}

impl Validation {
    /// Successful validation.
    #[must_use]
    pub fn accepted() -> Self {
        Self { valid: true, reason: String::new() }
    }

    /// Failed validation with the rendered rejection.
    #[must_use]
    pub fn rejected(rejection: &Rejection) -> Self {
        Self { valid: false, reason: rejection.to_string() }
    }
}

impl From<Result<(), Rejection>> for Validation {
    fn from(result: Result<(), Rejection>) -> Self {
        match result {
            Ok(()) => Self::accepted(),
            Err(rejection) => Self::rejected(&rejection),
        }
    }
}

/// Validate with the default BIC3232 limits.
#[must_use]
pub fn validate(command: &StimulationCommand) -> Validation {
    CommandValidator::default().validate(command)
}

/// Stateless validator for stimulation commands.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandValidator {
    limits: PulseLimits,
}

impl CommandValidator {
    /// Create a validator enforcing the given limits.
    #[must_use]
    pub const fn new(limits: PulseLimits) -> Self {
        Self { limits }
    }

    /// Limits in force.
    #[must_use]
    pub const fn limits(&self) -> &PulseLimits {
        &self.limits
    }

    /// Validate and render the outcome as a flag plus reason.
    #[must_use]
    pub fn validate(&self, command: &StimulationCommand) -> Validation {
        self.check(command).into()
    }

    /// Validate and return the first rejection.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] found, in check order.
    pub fn check(&self, command: &StimulationCommand) -> Result<(), Rejection> {
        let result = self.check_command(command);
        match &result {
            Ok(()) => tracing::trace!(
                command = command.name(),
                tracing_id = command.tracing_id(),
                "stimulation command accepted"
            ),
            Err(rejection) => tracing::debug!(
                command = command.name(),
                tracing_id = command.tracing_id(),
                category = rejection.category(),
                "stimulation command rejected: {}",
                rejection
            ),
        }
        result
    }

    fn check_command(&self, command: &StimulationCommand) -> Result<(), Rejection> {
        if command.is_empty() {
            return Err(StructuralError::EmptyCommand.into());
        }
        if command.repetitions() == 0 {
            return Err(StructuralError::ZeroCommandRepetitions.into());
        }

        for (index, function) in command.functions().iter().enumerate() {
            let function_ref = FunctionRef { index, name: function.name().to_string() };
            self.check_function(function, &function_ref)?;
        }

        Ok(())
    }

    fn check_function(
        &self,
        function: &StimulationFunction,
        function_ref: &FunctionRef,
    ) -> Result<(), Rejection> {
        let atom_type = check_atom_typing(function, function_ref)?;
        self.check_electrodes(function, function_ref)?;

        match atom_type {
            AtomType::Rectangular4Amplitude => self.check_pulse(function.atoms(), function_ref),
            AtomType::Pause => check_pause(function.atoms(), function_ref),
            AtomType::Rectangular | AtomType::Unsupported | AtomType::NoType => {
                Err(StructuralError::UnsupportedAtomType {
                    function: function_ref.clone(),
                    atom_type,
                }
                .into())
            }
        }
    }

    fn check_electrodes(
        &self,
        function: &StimulationFunction,
        function_ref: &FunctionRef,
    ) -> Result<(), Rejection> {
        let electrodes = function.virtual_electrodes();

        if electrodes.sources().is_empty() {
            return Err(ElectrodeConstraintError::EmptySource { function: function_ref.clone() }.into());
        }
        if electrodes.destinations().is_empty() && !electrodes.uses_ground_electrode() {
            return Err(
                ElectrodeConstraintError::EmptyDestination { function: function_ref.clone() }.into()
            );
        }
        if let Some(electrode) = electrodes.overlap() {
            return Err(ElectrodeConstraintError::Overlap {
                function: function_ref.clone(),
                electrode,
            }
            .into());
        }
        if let Some(electrode) = electrodes.all().find(|&e| !self.limits.electrode_in_range(e)) {
            return Err(ElectrodeConstraintError::OutOfRange {
                function: function_ref.clone(),
                electrode,
                channel_count: self.limits.channel_count,
            }
            .into());
        }

        Ok(())
    }

    fn check_pulse(
        &self,
        atoms: &[StimulationAtom],
        function_ref: &FunctionRef,
    ) -> Result<(), Rejection> {
        let [main, dead_zone, counter, dead_zone_repeat, post_pause] = atoms else {
            return Err(StructuralError::WrongAtomCount {
                function: function_ref.clone(),
                pattern: FunctionPattern::Pulse,
                expected: PulseRole::ATOM_COUNT,
                actual: atoms.len(),
            }
            .into());
        };

        let pulse = PulseCheck { limits: &self.limits, function: function_ref };

        pulse.main(main)?;
        pulse.dead_zone(dead_zone, PulseRole::DeadZone)?;
        pulse.counter(main, counter)?;
        pulse.dead_zone(dead_zone_repeat, PulseRole::DeadZoneRepeat)?;
        if dead_zone.duration_us() != dead_zone_repeat.duration_us() {
            return Err(PulseShapeError::DeadZoneMismatch {
                function: function_ref.clone(),
                first_us: dead_zone.duration_us(),
                second_us: dead_zone_repeat.duration_us(),
            }
            .into());
        }
        pulse.post_pause(post_pause)?;

        Ok(())
    }
}

/// Return the common atom type, or the structural fault that prevents one.
fn check_atom_typing(
    function: &StimulationFunction,
    function_ref: &FunctionRef,
) -> Result<AtomType, Rejection> {
    let atoms = function.atoms();
    let Some(first) = atoms.first() else {
        return Err(StructuralError::EmptyFunction { function: function_ref.clone() }.into());
    };
    if function.repetitions() == 0 {
        return Err(StructuralError::ZeroRepetitions { function: function_ref.clone() }.into());
    }
    if function.atom_type().is_none() {
        return Err(StructuralError::MixedAtomTypes { function: function_ref.clone() }.into());
    }
    if first.atom_type() == AtomType::NoType {
        return Err(StructuralError::UntypedAtom { function: function_ref.clone(), atom: 1 }.into());
    }
    Ok(first.atom_type())
}

fn check_pause(atoms: &[StimulationAtom], function_ref: &FunctionRef) -> Result<(), Rejection> {
    if atoms.len() == 1 {
        Ok(())
    } else {
        Err(StructuralError::WrongAtomCount {
            function: function_ref.clone(),
            pattern: FunctionPattern::Pause,
            expected: 1,
            actual: atoms.len(),
        }
        .into())
    }
}

// ============================================================================
// Pulse Shape
// ============================================================================

/// Per-atom checks of a five-atom pulse.
struct PulseCheck<'a> {
    limits: &'a PulseLimits,
    function: &'a FunctionRef,
}

impl PulseCheck<'_> {
    fn main(&self, atom: &StimulationAtom) -> Result<(), PulseShapeError> {
        for &amplitude_ua in atom.amplitudes_ua() {
            if !self.limits.main_amplitude_in_range(amplitude_ua) {
                return Err(PulseShapeError::AmplitudeOutOfRange {
                    function: self.function.clone(),
                    role: PulseRole::Main,
                    amplitude_ua,
                    min_ua: self.limits.main_amplitude_min_ua,
                    max_ua: self.limits.main_amplitude_max_ua(),
                });
            }
            if !self.limits.main_amplitude_on_grid(amplitude_ua) {
                return Err(PulseShapeError::AmplitudeOffGrid {
                    function: self.function.clone(),
                    role: PulseRole::Main,
                    amplitude_ua,
                    step_ua: self.limits.amplitude_step_ua(amplitude_ua),
                });
            }
        }
        self.pulse_duration(atom.duration_us(), PulseRole::Main)
    }

    fn dead_zone(&self, atom: &StimulationAtom, role: PulseRole) -> Result<(), PulseShapeError> {
        self.zero_amplitude(atom, role)?;
        self.pulse_duration(atom.duration_us(), role)
    }

    fn counter(&self, main: &StimulationAtom, counter: &StimulationAtom) -> Result<(), PulseShapeError> {
        let ratio = self.limits.counter_ratio;

        // Exact: ratio × counter == -main, no rounding tolerance
        for (&main_ua, &counter_ua) in main.amplitudes_ua().iter().zip(counter.amplitudes_ua()) {
            let balanced = i64::from(counter_ua) * i64::from(ratio) == -i64::from(main_ua);
            if !balanced {
                return Err(PulseShapeError::CounterAmplitudeMismatch {
                    function: self.function.clone(),
                    main_ua,
                    counter_ua,
                    ratio,
                });
            }
        }

        let expected_us = main.duration_us().checked_mul(u64::from(ratio));
        if expected_us != Some(counter.duration_us()) {
            return Err(PulseShapeError::CounterDurationMismatch {
                function: self.function.clone(),
                main_us: main.duration_us(),
                counter_us: counter.duration_us(),
                ratio,
            });
        }

        Ok(())
    }

    fn post_pause(&self, atom: &StimulationAtom) -> Result<(), PulseShapeError> {
        let role = PulseRole::PostPulsePause;
        self.zero_amplitude(atom, role)?;

        let duration_us = atom.duration_us();
        if !self.limits.pause_duration_in_range(duration_us) {
            return Err(PulseShapeError::DurationOutOfRange {
                function: self.function.clone(),
                role,
                duration_us,
                min_us: self.limits.pause_duration_min_us,
                max_us: self.limits.pause_duration_max_us,
            });
        }
        if !self.limits.pause_duration_on_grid(duration_us) {
            return Err(PulseShapeError::DurationOffGrid {
                function: self.function.clone(),
                role,
                duration_us,
                step_us: self.limits.pause_duration_step_us,
            });
        }
        Ok(())
    }

    fn zero_amplitude(&self, atom: &StimulationAtom, role: PulseRole) -> Result<(), PulseShapeError> {
        match atom.amplitudes_ua().iter().find(|&&a| a != 0) {
            Some(&amplitude_ua) => Err(PulseShapeError::NonZeroAmplitude {
                function: self.function.clone(),
                role,
                amplitude_ua,
            }),
            None => Ok(()),
        }
    }

    fn pulse_duration(&self, duration_us: u64, role: PulseRole) -> Result<(), PulseShapeError> {
        if !self.limits.pulse_duration_in_range(duration_us) {
            return Err(PulseShapeError::DurationOutOfRange {
                function: self.function.clone(),
                role,
                duration_us,
                min_us: self.limits.pulse_duration_min_us,
                max_us: self.limits.pulse_duration_max_us,
            });
        }
        if !self.limits.pulse_duration_on_grid(duration_us) {
            return Err(PulseShapeError::DurationOffGrid {
                function: self.function.clone(),
                role,
                duration_us,
                step_us: self.limits.pulse_duration_step_us,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::GridPolicy;

    fn pulse(atoms: [StimulationAtom; 5]) -> StimulationCommand {
        let mut function = StimulationFunction::new("pulse");
        for atom in atoms {
            function.append(atom).unwrap();
        }
        function.set_virtual_electrodes([0], [1], false).unwrap();

        let mut command = StimulationCommand::new("cmd");
        command.append(function).unwrap();
        command
    }

    fn valid_pulse() -> StimulationCommand {
        pulse([
            StimulationAtom::rect4(-1200, 400),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(300, 1600),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(0, 800),
        ])
    }

    fn rejection(command: &StimulationCommand) -> Rejection {
        CommandValidator::default().check(command).unwrap_err()
    }

    #[test]
    fn test_valid_pulse_accepted() {
        assert_eq!(validate(&valid_pulse()), Validation::accepted());
    }

    #[test]
    fn test_empty_command_rejected() {
        let command = StimulationCommand::new("empty");
        assert_eq!(rejection(&command), Rejection::Structural(StructuralError::EmptyCommand));
    }

    #[test]
    fn test_main_amplitude_checks() {
        let command = pulse([
            StimulationAtom::rect4(-13, 400),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(3, 1600),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(0, 800),
        ]);
        assert!(matches!(
            rejection(&command),
            Rejection::PulseShape(PulseShapeError::AmplitudeOffGrid { step_ua: 12, .. })
        ));

        let command = pulse([
            StimulationAtom::rect4(12, 400),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(-3, 1600),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(0, 800),
        ]);
        assert!(matches!(
            rejection(&command),
            Rejection::PulseShape(PulseShapeError::AmplitudeOutOfRange { amplitude_ua: 12, .. })
        ));
    }

    #[test]
    fn test_dead_zone_checks() {
        let command = pulse([
            StimulationAtom::rect4(-1200, 400),
            StimulationAtom::rect4(12, 100),
            StimulationAtom::rect4(300, 1600),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(0, 800),
        ]);
        assert!(matches!(
            rejection(&command),
            Rejection::PulseShape(PulseShapeError::NonZeroAmplitude { role: PulseRole::DeadZone, .. })
        ));

        let command = pulse([
            StimulationAtom::rect4(-1200, 400),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(300, 1600),
            StimulationAtom::rect4(0, 110),
            StimulationAtom::rect4(0, 800),
        ]);
        assert!(matches!(
            rejection(&command),
            Rejection::PulseShape(PulseShapeError::DeadZoneMismatch {
                first_us: 100,
                second_us: 110,
                ..
            })
        ));
    }

    #[test]
    fn test_counter_duration_ratio() {
        let command = pulse([
            StimulationAtom::rect4(-1200, 400),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(300, 1590),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(0, 800),
        ]);
        assert!(matches!(
            rejection(&command),
            Rejection::PulseShape(PulseShapeError::CounterDurationMismatch { main_us: 400, counter_us: 1590, .. })
        ));
        assert!(validate(&command).reason.starts_with("atom 3 (counter pulse)"));
    }

    #[test]
    fn test_post_pause_grid() {
        let command = pulse([
            StimulationAtom::rect4(-1200, 400),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(300, 1600),
            StimulationAtom::rect4(0, 100),
            StimulationAtom::rect4(0, 2550),
        ]);
        assert!(matches!(
            rejection(&command),
            Rejection::PulseShape(PulseShapeError::DurationOffGrid {
                role: PulseRole::PostPulsePause,
                step_us: 80,
                ..
            })
        ));

        let relaxed = CommandValidator::new(PulseLimits::BIC3232.with_grid(GridPolicy::RangeOnly));
        assert!(relaxed.check(&command).is_ok());
    }

    #[test]
    fn test_rectangular_function_unsupported() {
        let mut function = StimulationFunction::new("rect");
        function.append(StimulationAtom::rectangular(-12, 100)).unwrap();
        function.set_virtual_electrodes([0], [1], false).unwrap();
        let mut command = StimulationCommand::new("cmd");
        command.append(function).unwrap();

        assert!(matches!(
            rejection(&command),
            Rejection::Structural(StructuralError::UnsupportedAtomType {
                atom_type: AtomType::Rectangular,
                ..
            })
        ));
    }

    #[test]
    fn test_pause_needs_single_atom() {
        let mut function = StimulationFunction::new("pauses");
        function.append(StimulationAtom::pause(100)).unwrap();
        function.append(StimulationAtom::pause(100)).unwrap();
        function.set_virtual_electrodes([0], [1], false).unwrap();
        let mut command = StimulationCommand::new("cmd");
        command.append(function).unwrap();

        assert!(matches!(
            rejection(&command),
            Rejection::Structural(StructuralError::WrongAtomCount {
                pattern: FunctionPattern::Pause,
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_electrode_out_of_range() {
        let mut function = StimulationFunction::new("far");
        function.append(StimulationAtom::pause(100)).unwrap();
        function.set_virtual_electrodes([0], [32], false).unwrap();
        let mut command = StimulationCommand::new("cmd");
        command.append(function).unwrap();

        assert!(matches!(
            rejection(&command),
            Rejection::Electrode(ElectrodeConstraintError::OutOfRange {
                electrode: 32,
                channel_count: 32,
                ..
            })
        ));
    }

    #[test]
    fn test_ground_substitutes_destination() {
        let mut function = StimulationFunction::new("to-ground");
        function.append(StimulationAtom::pause(100)).unwrap();
        function.set_virtual_electrodes([4, 5], [0u32; 0], true).unwrap();
        let mut command = StimulationCommand::new("cmd");
        command.append(function).unwrap();

        assert!(validate(&command).valid);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let command = valid_pulse();
        let validator = CommandValidator::default();
        let first = validator.validate(&command);
        for _ in 0..10 {
            assert_eq!(validator.validate(&command), first);
        }
    }
}
