//! Stimulation command data model.
//!
//! A [`StimulationCommand`] is an ordered sequence of [`StimulationFunction`]s.
//! Each function is an ordered sequence of [`StimulationAtom`]s of a single
//! type, repeated a number of times and applied between two
//! [`VirtualElectrodes`] sets.
//!
//! Composition moves values into their parent: once an atom is appended to a
//! function, or a function to a command, the caller no longer holds it.
//!
//! # Example
//!
//! ```rust
//! use bicstim_core::types::{StimulationAtom, StimulationCommand, StimulationFunction};
//!
//! let mut pulse = StimulationFunction::new("pulse");
//! pulse.append(StimulationAtom::rect4(-1200, 400)).unwrap();
//! pulse.append(StimulationAtom::rect4(0, 100)).unwrap();
//! pulse.append(StimulationAtom::rect4(300, 1600)).unwrap();
//! pulse.append(StimulationAtom::rect4(0, 100)).unwrap();
//! pulse.append(StimulationAtom::rect4(0, 800)).unwrap();
//! pulse.set_repetitions(10).unwrap();
//! pulse.set_virtual_electrodes([0], [1], false).unwrap();
//!
//! let mut command = StimulationCommand::new("demo");
//! command.append(pulse).unwrap();
//! assert_eq!(command.duration_us(), 10 * 3000);
//! ```

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CompositionError;

// ============================================================================
// Atom Types
// ============================================================================

/// Type tag of a stimulation atom.
///
/// Discriminants match the ordinals of the driver's `AtomType` enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AtomType {
    /// Atom without a type, never valid
    NoType = 0,
    /// Single constant amplitude
    Rectangular = 1,
    /// Four constant amplitudes for one duration
    Rectangular4Amplitude = 2,
    /// No stimulation for a duration
    Pause = 3,
    /// Type the driver does not support
    Unsupported = 4,
}

impl AtomType {
    /// All atom types in driver ordinal order
    pub const ALL: [Self; 5] = [
        Self::NoType,
        Self::Rectangular,
        Self::Rectangular4Amplitude,
        Self::Pause,
        Self::Unsupported,
    ];

    /// Driver ordinal of this type.
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    /// Convert a driver ordinal into an atom type.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::NoType),
            1 => Some(Self::Rectangular),
            2 => Some(Self::Rectangular4Amplitude),
            3 => Some(Self::Pause),
            4 => Some(Self::Unsupported),
            _ => None,
        }
    }

    /// Short name used in rejection messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoType => "untyped",
            Self::Rectangular => "rectangular",
            Self::Rectangular4Amplitude => "rectangular-4",
            Self::Pause => "pause",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Stimulation Atoms
// ============================================================================

/// Smallest segment of a stimulation waveform.
///
/// Amplitudes are in µA (signed), durations in µs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StimulationAtom {
    /// Atom with no type
    NoType,
    /// Constant amplitude for a fixed duration
    Rectangular {
        /// Amplitude in µA
        amplitude_ua: i32,
        /// Duration in µs
        duration_us: u64,
    },
    /// Four constant amplitudes for a fixed duration
    Rectangular4 {
        /// Amplitudes in µA
        amplitudes_ua: [i32; 4],
        /// Duration in µs
        duration_us: u64,
    },
    /// No stimulation for a fixed duration
    Pause {
        /// Duration in µs
        duration_us: u64,
    },
    /// Atom of a type the driver does not support
    Unsupported,
}

impl StimulationAtom {
    /// Rectangular atom with a single amplitude.
    #[inline]
    #[must_use]
    pub const fn rectangular(amplitude_ua: i32, duration_us: u64) -> Self {
        Self::Rectangular { amplitude_ua, duration_us }
    }

    /// Rectangular-4 atom with all four amplitudes given.
    #[inline]
    #[must_use]
    pub const fn rectangular4(amplitudes_ua: [i32; 4], duration_us: u64) -> Self {
        Self::Rectangular4 { amplitudes_ua, duration_us }
    }

    /// Rectangular-4 atom driving only the first amplitude.
    #[inline]
    #[must_use]
    pub const fn rect4(amplitude_ua: i32, duration_us: u64) -> Self {
        Self::rectangular4([amplitude_ua, 0, 0, 0], duration_us)
    }

    /// Pause atom.
    #[inline]
    #[must_use]
    pub const fn pause(duration_us: u64) -> Self {
        Self::Pause { duration_us }
    }

    /// Duration in µs (0 for untyped and unsupported atoms).
    #[must_use]
    pub const fn duration_us(&self) -> u64 {
        match self {
            Self::Rectangular { duration_us, .. }
            | Self::Rectangular4 { duration_us, .. }
            | Self::Pause { duration_us } => *duration_us,
            Self::NoType | Self::Unsupported => 0,
        }
    }

    /// Type tag of this atom.
    #[must_use]
    pub const fn atom_type(&self) -> AtomType {
        match self {
            Self::NoType => AtomType::NoType,
            Self::Rectangular { .. } => AtomType::Rectangular,
            Self::Rectangular4 { .. } => AtomType::Rectangular4Amplitude,
            Self::Pause { .. } => AtomType::Pause,
            Self::Unsupported => AtomType::Unsupported,
        }
    }

    /// Amplitudes carried by the atom, empty for pauses and untyped atoms.
    #[must_use]
    pub fn amplitudes_ua(&self) -> &[i32] {
        match self {
            Self::Rectangular { amplitude_ua, .. } => core::slice::from_ref(amplitude_ua),
            Self::Rectangular4 { amplitudes_ua, .. } => &amplitudes_ua[..],
            Self::Pause { .. } | Self::NoType | Self::Unsupported => &[],
        }
    }
}

// ============================================================================
// Pulse Roles
// ============================================================================

/// Role of each atom in a five-atom stimulation pulse.
///
/// ```text
///                   ____
///  Pulse      _   _|    |_ _____
///              | |
///              |_|
///
///  Atom         1 2   3  4   5
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PulseRole {
    /// Main pulse
    Main,
    /// Dead zone between main and counter pulse
    DeadZone,
    /// Charge-balancing counter pulse
    Counter,
    /// Dead zone after the counter pulse, identical to the first
    DeadZoneRepeat,
    /// Pause after the pulse was delivered
    PostPulsePause,
}

impl PulseRole {
    /// Roles in atom order
    pub const ORDER: [Self; 5] = [
        Self::Main,
        Self::DeadZone,
        Self::Counter,
        Self::DeadZoneRepeat,
        Self::PostPulsePause,
    ];

    /// Number of atoms in a pulse
    pub const ATOM_COUNT: usize = 5;

    /// 1-based atom position of this role.
    #[must_use]
    pub const fn position(self) -> usize {
        match self {
            Self::Main => 1,
            Self::DeadZone => 2,
            Self::Counter => 3,
            Self::DeadZoneRepeat => 4,
            Self::PostPulsePause => 5,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Main => "main pulse",
            Self::DeadZone => "dead zone",
            Self::Counter => "counter pulse",
            Self::DeadZoneRepeat => "repeated dead zone",
            Self::PostPulsePause => "post-pulse pause",
        }
    }
}

impl fmt::Display for PulseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom {} ({})", self.position(), self.name())
    }
}

// ============================================================================
// Virtual Electrodes
// ============================================================================

/// Source and destination electrode sets of a stimulation function.
///
/// Stimulation flows from the source set into the destination set. The
/// ground electrode may stand in for an empty destination set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualElectrodes {
    sources: BTreeSet<u32>,
    destinations: BTreeSet<u32>,
    #[serde(default)]
    use_ground: bool,
}

impl VirtualElectrodes {
    /// Create an electrode assignment.
    ///
    /// # Errors
    ///
    /// Fails if the sets share an electrode, the source set is empty, or the
    /// destination set is empty without the ground electrode.
    pub fn new(
        sources: impl IntoIterator<Item = u32>,
        destinations: impl IntoIterator<Item = u32>,
        use_ground: bool,
    ) -> Result<Self, CompositionError> {
        let electrodes = Self {
            sources: sources.into_iter().collect(),
            destinations: destinations.into_iter().collect(),
            use_ground,
        };

        if let Some(electrode) = electrodes.overlap() {
            return Err(CompositionError::ElectrodeOverlap { electrode });
        }
        if electrodes.sources.is_empty() {
            return Err(CompositionError::EmptySourceElectrodes);
        }
        if electrodes.destinations.is_empty() && !use_ground {
            return Err(CompositionError::EmptyDestinationElectrodes);
        }

        Ok(electrodes)
    }

    /// Source electrode indices.
    #[must_use]
    pub fn sources(&self) -> &BTreeSet<u32> {
        &self.sources
    }

    /// Destination electrode indices (without the ground electrode).
    #[must_use]
    pub fn destinations(&self) -> &BTreeSet<u32> {
        &self.destinations
    }

    /// Check if stimulation to ground is enabled.
    #[must_use]
    pub const fn uses_ground_electrode(&self) -> bool {
        self.use_ground
    }

    /// Lowest electrode index present in both sets, if any.
    #[must_use]
    pub fn overlap(&self) -> Option<u32> {
        self.sources.intersection(&self.destinations).next().copied()
    }

    /// Iterate over every electrode index in either set.
    pub fn all(&self) -> impl Iterator<Item = u32> + '_ {
        self.sources.iter().chain(self.destinations.iter()).copied()
    }
}

// ============================================================================
// Stimulation Function
// ============================================================================

/// A sequence of atoms applied to a pair of virtual electrodes.
///
/// Two shapes are meaningful to the implant: a pause (one pause atom) and a
/// pulse (five rectangular-4 atoms, see [`PulseRole`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulationFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    atoms: Vec<StimulationAtom>,
    #[serde(default = "default_function_repetitions")]
    repetitions: u32,
    #[serde(default)]
    electrodes: VirtualElectrodes,
}

const fn default_function_repetitions() -> u32 {
    1
}

impl StimulationFunction {
    /// Create an empty function with one repetition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            atoms: Vec::new(),
            repetitions: 1,
            electrodes: VirtualElectrodes::default(),
        }
    }

    /// Append an atom, taking ownership of it.
    ///
    /// # Errors
    ///
    /// Fails for untyped atoms and for atoms whose type differs from the
    /// atoms already in the function.
    pub fn append(&mut self, atom: StimulationAtom) -> Result<(), CompositionError> {
        let atom_type = atom.atom_type();
        if atom_type == AtomType::NoType {
            return Err(CompositionError::UntypedAtom);
        }
        if let Some(first) = self.atoms.first() {
            if first.atom_type() != atom_type {
                return Err(CompositionError::MixedAtomType {
                    expected: first.atom_type(),
                    got: atom_type,
                });
            }
        }
        self.atoms.push(atom);
        Ok(())
    }

    /// Set how often the atom sequence is repeated.
    ///
    /// # Errors
    ///
    /// Fails if `repetitions` is 0.
    pub fn set_repetitions(&mut self, repetitions: u32) -> Result<(), CompositionError> {
        if repetitions == 0 {
            return Err(CompositionError::ZeroRepetitions);
        }
        self.repetitions = repetitions;
        Ok(())
    }

    /// Set the source and destination electrodes.
    ///
    /// # Errors
    ///
    /// See [`VirtualElectrodes::new`].
    pub fn set_virtual_electrodes(
        &mut self,
        sources: impl IntoIterator<Item = u32>,
        destinations: impl IntoIterator<Item = u32>,
        use_ground: bool,
    ) -> Result<(), CompositionError> {
        self.electrodes = VirtualElectrodes::new(sources, destinations, use_ground)?;
        Ok(())
    }

    /// Function name, empty if not given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Atoms in order.
    #[must_use]
    pub fn atoms(&self) -> &[StimulationAtom] {
        &self.atoms
    }

    /// Number of repetitions.
    #[must_use]
    pub const fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Electrode assignment.
    #[must_use]
    pub const fn virtual_electrodes(&self) -> &VirtualElectrodes {
        &self.electrodes
    }

    /// Check if stimulation to ground is enabled.
    #[must_use]
    pub const fn uses_ground_electrode(&self) -> bool {
        self.electrodes.uses_ground_electrode()
    }

    /// Common type of all atoms, `None` if the function is empty or mixed.
    #[must_use]
    pub fn atom_type(&self) -> Option<AtomType> {
        let first = self.atoms.first()?.atom_type();
        self.atoms
            .iter()
            .all(|atom| atom.atom_type() == first)
            .then_some(first)
    }

    /// Duration of one repetition in µs.
    #[must_use]
    pub fn period_us(&self) -> u64 {
        self.atoms
            .iter()
            .fold(0u64, |acc, atom| acc.saturating_add(atom.duration_us()))
    }

    /// Total duration in µs including all repetitions.
    #[must_use]
    pub fn duration_us(&self) -> u64 {
        self.period_us().saturating_mul(u64::from(self.repetitions))
    }

    /// Check if `other` has pairwise equal atoms; repetitions are ignored.
    #[must_use]
    pub fn has_equal_signal_form(&self, other: &Self) -> bool {
        self.atoms == other.atoms
    }

    /// Check if `other` uses the same virtual electrodes.
    #[must_use]
    pub fn has_equal_virtual_electrodes(&self, other: &Self) -> bool {
        self.electrodes == other.electrodes
    }
}

// ============================================================================
// Stimulation Command
// ============================================================================

/// A sequence of stimulation functions sent to the implant as one unit.
///
/// With command repetitions set to 3 and functions `A`, `B` the implant runs
/// `A | B | A | B | A | B`. If `A` additionally repeats twice, it runs
/// `A | A | B | A | A | B | A | A | B`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulationCommand {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tracing_id: u16,
    #[serde(default = "default_command_repetitions")]
    repetitions: u16,
    #[serde(default)]
    functions: Vec<StimulationFunction>,
}

const fn default_command_repetitions() -> u16 {
    1
}

impl StimulationCommand {
    /// Create an empty command with one repetition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracing_id: 0,
            repetitions: 1,
            functions: Vec::new(),
        }
    }

    /// Append a function, taking ownership of it.
    ///
    /// # Errors
    ///
    /// Fails if the function has a total duration of 0 µs.
    pub fn append(&mut self, function: StimulationFunction) -> Result<(), CompositionError> {
        if function.duration_us() == 0 {
            return Err(CompositionError::ZeroDurationFunction);
        }
        self.functions.push(function);
        Ok(())
    }

    /// Set how often the whole function sequence is repeated.
    ///
    /// # Errors
    ///
    /// Fails if `repetitions` is 0.
    pub fn set_repetitions(&mut self, repetitions: u16) -> Result<(), CompositionError> {
        if repetitions == 0 {
            return Err(CompositionError::ZeroRepetitions);
        }
        self.repetitions = repetitions;
        Ok(())
    }

    /// Set the id used to correlate executions in driver logs.
    pub fn set_tracing_id(&mut self, tracing_id: u16) {
        self.tracing_id = tracing_id;
    }

    /// Command name, empty if not given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tracing id.
    #[must_use]
    pub const fn tracing_id(&self) -> u16 {
        self.tracing_id
    }

    /// Number of command repetitions.
    #[must_use]
    pub const fn repetitions(&self) -> u16 {
        self.repetitions
    }

    /// Functions in order, unaware of any repetitions.
    #[must_use]
    pub fn functions(&self) -> &[StimulationFunction] {
        &self.functions
    }

    /// Check if the command has no functions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Number of functions including command repetitions (not function repetitions).
    #[must_use]
    pub fn size(&self) -> u64 {
        (self.functions.len() as u64).saturating_mul(u64::from(self.repetitions))
    }

    /// Total duration in µs including function and command repetitions.
    #[must_use]
    pub fn duration_us(&self) -> u64 {
        self.functions
            .iter()
            .fold(0u64, |acc, function| acc.saturating_add(function.duration_us()))
            .saturating_mul(u64::from(self.repetitions))
    }

    /// Iterate functions, yielding each one `repetitions` times in a row.
    pub fn repetition_aware_functions(&self) -> impl Iterator<Item = &StimulationFunction> + '_ {
        self.functions
            .iter()
            .flat_map(|function| core::iter::repeat(function).take(function.repetitions as usize))
    }

    /// Iterate functions, cycling the whole sequence once per command repetition.
    pub fn command_repetition_aware_functions(
        &self,
    ) -> impl Iterator<Item = &StimulationFunction> + '_ {
        (0..self.repetitions).flat_map(move |_| self.functions.iter())
    }
}

// ============================================================================
// Tests
// ============================================================================
