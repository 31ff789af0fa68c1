//! Error types for bicstim
//!
//! Two families live here:
//!
//! - [`CompositionError`]: returned while a command is being built
//!   (appending atoms or functions, setting repetitions or electrodes).
//! - [`Rejection`]: the reason a fully composed command failed validation.
//!   Rejections are ordinary values reported to the operator, never panics.
//!
//! Both implement `Display` without `std` so they can be rendered on the
//! embedded side as well.

use alloc::string::String;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{AtomType, PulseRole};

// ============================================================================
// Composition Errors
// ============================================================================

/// Errors raised while composing atoms, functions and commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositionError {
    /// Atom without a type cannot be appended
    UntypedAtom,
    /// Atom type differs from the atoms already in the function
    MixedAtomType {
        /// Type of the atoms already present
        expected: AtomType,
        /// Type of the rejected atom
        got: AtomType,
    },
    /// Repetition count of 0
    ZeroRepetitions,
    /// Function with a total duration of 0 µs
    ZeroDurationFunction,
    /// Electrode is both source and destination
    ElectrodeOverlap {
        /// Shared electrode index
        electrode: u32,
    },
    /// Source electrode set is empty
    EmptySourceElectrodes,
    /// Destination set is empty and ground is not used
    EmptyDestinationElectrodes,
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UntypedAtom => write!(f, "Cannot append an atom without a type"),
            Self::MixedAtomType { expected, got } => {
                write!(f, "Cannot append {got} atom to a function of {expected} atoms")
            }
            Self::ZeroRepetitions => write!(f, "Repetitions must be at least 1"),
            Self::ZeroDurationFunction => {
                write!(f, "Cannot append a function with a duration of 0µs")
            }
            Self::ElectrodeOverlap { electrode } => {
                write!(f, "Electrode {electrode} is both source and destination")
            }
            Self::EmptySourceElectrodes => write!(f, "Source electrode set is empty"),
            Self::EmptyDestinationElectrodes => {
                write!(f, "Destination electrode set is empty and ground is not used")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CompositionError {}

// ============================================================================
// Function Reference
// ============================================================================

/// Identifies a function inside a command in rejection messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    /// Position of the function in the command (0-based)
    pub index: usize,
    /// Function name, may be empty
    pub name: String,
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "#{}", self.index)
        } else {
            f.write_str(&self.name)
        }
    }
}

// ============================================================================
// Structural Errors
// ============================================================================

/// Shape of a function expected from its atom type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionPattern {
    /// Five rectangular-4 atoms
    Pulse,
    /// One pause atom
    Pause,
}

impl fmt::Display for FunctionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pulse => f.write_str("pulse"),
            Self::Pause => f.write_str("pause"),
        }
    }
}

/// The command or a function does not have a shape the implant can run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralError {
    /// Command without functions
    EmptyCommand,
    /// Command repetitions of 0
    ZeroCommandRepetitions,
    /// Function without atoms
    EmptyFunction {
        /// Offending function
        function: FunctionRef,
    },
    /// Function repetitions of 0
    ZeroRepetitions {
        /// Offending function
        function: FunctionRef,
    },
    /// Atoms of different types in one function
    MixedAtomTypes {
        /// Offending function
        function: FunctionRef,
    },
    /// Atom without a type
    UntypedAtom {
        /// Offending function
        function: FunctionRef,
        /// 1-based atom index
        atom: usize,
    },
    /// Atom type that forms neither a pulse nor a pause
    UnsupportedAtomType {
        /// Offending function
        function: FunctionRef,
        /// Type of the atoms
        atom_type: AtomType,
    },
    /// Atom count does not match the pattern of the function
    WrongAtomCount {
        /// Offending function
        function: FunctionRef,
        /// Pattern implied by the atom type
        pattern: FunctionPattern,
        /// Required atom count
        expected: usize,
        /// Actual atom count
        actual: usize,
    },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCommand => write!(f, "command contains no functions"),
            Self::ZeroCommandRepetitions => write!(f, "command repetitions must be at least 1"),
            Self::EmptyFunction { function } => {
                write!(f, "function {function} contains no atoms")
            }
            Self::ZeroRepetitions { function } => {
                write!(f, "repetitions of function {function} must be at least 1")
            }
            Self::MixedAtomTypes { function } => {
                write!(f, "mixed atom types in function {function}")
            }
            Self::UntypedAtom { function, atom } => {
                write!(f, "atom {atom} of function {function} has no type")
            }
            Self::UnsupportedAtomType { function, atom_type } => {
                write!(
                    f,
                    "function {function} uses {atom_type} atoms, which form neither a pulse nor a pause"
                )
            }
            Self::WrongAtomCount { function, pattern, expected, actual } => {
                write!(
                    f,
                    "{pattern} function {function} must have exactly {expected} atoms, got {actual}"
                )
            }
        }
    }
}

// ============================================================================
// Electrode Constraint Errors
// ============================================================================

/// The virtual electrodes of a function are not usable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectrodeConstraintError {
    /// No source electrode
    EmptySource {
        /// Offending function
        function: FunctionRef,
    },
    /// No destination electrode and ground not used
    EmptyDestination {
        /// Offending function
        function: FunctionRef,
    },
    /// Electrode in both sets
    Overlap {
        /// Offending function
        function: FunctionRef,
        /// Shared electrode index
        electrode: u32,
    },
    /// Electrode index beyond the implant's channel count
    OutOfRange {
        /// Offending function
        function: FunctionRef,
        /// Electrode index
        electrode: u32,
        /// Number of channels of the implant
        channel_count: u32,
    },
}

impl fmt::Display for ElectrodeConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySource { function } => {
                write!(f, "function {function} has no source electrode")
            }
            Self::EmptyDestination { function } => {
                write!(
                    f,
                    "function {function} has no destination electrode and does not use ground"
                )
            }
            Self::Overlap { function, electrode } => {
                write!(
                    f,
                    "electrode overlap in function {function}: electrode {electrode} is both source and destination"
                )
            }
            Self::OutOfRange { function, electrode, channel_count } => {
                write!(
                    f,
                    "electrode {electrode} of function {function} is out of range (channels 0..{channel_count})"
                )
            }
        }
    }
}

// ============================================================================
// Pulse Shape Errors
// ============================================================================

/// A five-atom pulse violates the waveform constraints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PulseShapeError {
    /// Amplitude outside the permitted range
    AmplitudeOutOfRange {
        /// Offending function
        function: FunctionRef,
        /// Offending atom
        role: PulseRole,
        /// Amplitude in µA
        amplitude_ua: i32,
        /// Lowest permitted amplitude in µA
        min_ua: i32,
        /// Highest permitted amplitude in µA
        max_ua: i32,
    },
    /// Amplitude not on the step grid
    AmplitudeOffGrid {
        /// Offending function
        function: FunctionRef,
        /// Offending atom
        role: PulseRole,
        /// Amplitude in µA
        amplitude_ua: i32,
        /// Required step in µA
        step_ua: u32,
    },
    /// Amplitude must be 0
    NonZeroAmplitude {
        /// Offending function
        function: FunctionRef,
        /// Offending atom
        role: PulseRole,
        /// Amplitude in µA
        amplitude_ua: i32,
    },
    /// Duration outside the permitted range
    DurationOutOfRange {
        /// Offending function
        function: FunctionRef,
        /// Offending atom
        role: PulseRole,
        /// Duration in µs
        duration_us: u64,
        /// Shortest permitted duration in µs
        min_us: u64,
        /// Longest permitted duration in µs
        max_us: u64,
    },
    /// Duration not on the step grid
    DurationOffGrid {
        /// Offending function
        function: FunctionRef,
        /// Offending atom
        role: PulseRole,
        /// Duration in µs
        duration_us: u64,
        /// Required step in µs
        step_us: u64,
    },
    /// Counter amplitude is not exactly -1/ratio of the main amplitude
    CounterAmplitudeMismatch {
        /// Offending function
        function: FunctionRef,
        /// Main pulse amplitude in µA
        main_ua: i32,
        /// Counter pulse amplitude in µA
        counter_ua: i32,
        /// Required main/counter ratio
        ratio: u32,
    },
    /// Counter duration is not exactly ratio × the main duration
    CounterDurationMismatch {
        /// Offending function
        function: FunctionRef,
        /// Main pulse duration in µs
        main_us: u64,
        /// Counter pulse duration in µs
        counter_us: u64,
        /// Required counter/main ratio
        ratio: u32,
    },
    /// The two dead zones differ
    DeadZoneMismatch {
        /// Offending function
        function: FunctionRef,
        /// First dead zone duration in µs
        first_us: u64,
        /// Second dead zone duration in µs
        second_us: u64,
    },
}

impl fmt::Display for PulseShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmplitudeOutOfRange { function, role, amplitude_ua, min_ua, max_ua } => {
                write!(
                    f,
                    "{role} of function {function}: amplitude {amplitude_ua}µA outside [{min_ua}, {max_ua}]µA"
                )
            }
            Self::AmplitudeOffGrid { function, role, amplitude_ua, step_ua } => {
                write!(
                    f,
                    "{role} of function {function}: amplitude {amplitude_ua}µA is not a multiple of {step_ua}µA"
                )
            }
            Self::NonZeroAmplitude { function, role, amplitude_ua } => {
                write!(f, "{role} of function {function}: amplitude {amplitude_ua}µA must be 0")
            }
            Self::DurationOutOfRange { function, role, duration_us, min_us, max_us } => {
                write!(
                    f,
                    "{role} of function {function}: duration {duration_us}µs outside [{min_us}, {max_us}]µs"
                )
            }
            Self::DurationOffGrid { function, role, duration_us, step_us } => {
                write!(
                    f,
                    "{role} of function {function}: duration {duration_us}µs is not on the {step_us}µs grid"
                )
            }
            Self::CounterAmplitudeMismatch { function, main_ua, counter_ua, ratio } => {
                write!(
                    f,
                    "{} of function {function}: counter-pulse ratio mismatch, amplitude {counter_ua}µA must be -1/{ratio} of main amplitude {main_ua}µA",
                    PulseRole::Counter
                )
            }
            Self::CounterDurationMismatch { function, main_us, counter_us, ratio } => {
                write!(
                    f,
                    "{} of function {function}: counter-pulse ratio mismatch, duration {counter_us}µs must be {ratio} × main duration {main_us}µs",
                    PulseRole::Counter
                )
            }
            Self::DeadZoneMismatch { function, first_us, second_us } => {
                write!(
                    f,
                    "dead zones of function {function} differ: atom 2 is {first_us}µs, atom 4 is {second_us}µs"
                )
            }
        }
    }
}

// ============================================================================
// Rejection
// ============================================================================

/// Why a stimulation command was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// Command or function shape is wrong
    Structural(StructuralError),
    /// Electrode sets are unusable
    Electrode(ElectrodeConstraintError),
    /// Pulse waveform violates its constraints
    PulseShape(PulseShapeError),
}

impl Rejection {
    /// Short category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Structural(_) => "structural",
            Self::Electrode(_) => "electrode",
            Self::PulseShape(_) => "pulse shape",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural(e) => fmt::Display::fmt(e, f),
            Self::Electrode(e) => fmt::Display::fmt(e, f),
            Self::PulseShape(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl From<StructuralError> for Rejection {
    fn from(e: StructuralError) -> Self {
        Self::Structural(e)
    }
}

impl From<ElectrodeConstraintError> for Rejection {
    fn from(e: ElectrodeConstraintError) -> Self {
        Self::Electrode(e)
    }
}

impl From<PulseShapeError> for Rejection {
    fn from(e: PulseShapeError) -> Self {
        Self::PulseShape(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Rejection {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_function_ref_display() {
        let named = FunctionRef { index: 3, name: "PulseExample".into() };
        let unnamed = FunctionRef { index: 3, name: String::new() };
        assert_eq!(named.to_string(), "PulseExample");
        assert_eq!(unnamed.to_string(), "#3");
    }

    #[test]
    fn test_rejection_messages() {
        let function = FunctionRef { index: 0, name: "f".into() };

        let mixed = Rejection::from(StructuralError::MixedAtomTypes { function: function.clone() });
        assert_eq!(mixed.to_string(), "mixed atom types in function f");
        assert_eq!(mixed.category(), "structural");

        let off_grid = Rejection::from(PulseShapeError::AmplitudeOffGrid {
            function,
            role: PulseRole::Main,
            amplitude_ua: -13,
            step_ua: 12,
        });
        let message = off_grid.to_string();
        assert!(message.starts_with("atom 1 (main pulse)"));
        assert!(message.contains("-13µA"));
    }

    #[test]
    fn test_counter_messages_name_atom() {
        let function = FunctionRef { index: 0, name: "p".into() };

        let amplitude = PulseShapeError::CounterAmplitudeMismatch {
            function: function.clone(),
            main_ua: -1200,
            counter_ua: 310,
            ratio: 4,
        };
        assert_eq!(
            amplitude.to_string(),
            "atom 3 (counter pulse) of function p: counter-pulse ratio mismatch, \
             amplitude 310µA must be -1/4 of main amplitude -1200µA"
        );

        let duration = PulseShapeError::CounterDurationMismatch {
            function,
            main_us: 400,
            counter_us: 1590,
            ratio: 4,
        };
        assert!(duration.to_string().starts_with("atom 3 (counter pulse)"));
        assert!(duration.to_string().contains("counter-pulse ratio mismatch"));
    }
}
