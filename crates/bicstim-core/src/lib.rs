//! bicstim core - `no_std` stimulation command model and validator
//!
//! This crate provides the data model for stimulation commands sent to a
//! BIC3232 implant and a client-side validator that checks those commands
//! against the implant's pulse waveform constraints before they reach the
//! driver. It needs `alloc` but not `std`.
//!
//! # Modules
//!
//! - [`types`]: Atoms, functions, commands and virtual electrodes
//! - [`limits`]: Amplitude, duration and electrode limits
//! - [`validate`]: The command validator
//! - [`error`]: Composition errors and rejection reasons
//!
//! # Features
//!
//! - `std`: Implement `std::error::Error` for the error types
//!
//! # Example
//!
//! ```rust
//! use bicstim_core::types::{StimulationAtom, StimulationCommand, StimulationFunction};
//! use bicstim_core::validate::validate;
//!
//! let mut pulse = StimulationFunction::new("pulse");
//! for atom in [
//!     StimulationAtom::rect4(-1200, 400),
//!     StimulationAtom::rect4(0, 100),
//!     StimulationAtom::rect4(310, 1600),
//!     StimulationAtom::rect4(0, 100),
//!     StimulationAtom::rect4(0, 800),
//! ] {
//!     pulse.append(atom).unwrap();
//! }
//! pulse.set_virtual_electrodes([0], [1], false).unwrap();
//!
//! let mut command = StimulationCommand::new("demo");
//! command.append(pulse).unwrap();
//!
//! let result = validate(&command);
//! assert!(!result.valid);
//! assert!(result.reason.contains("counter-pulse ratio mismatch"));
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod limits;
pub mod types;
pub mod validate;

// Re-export commonly used types at crate root
pub use error::{
    CompositionError, ElectrodeConstraintError, FunctionRef, PulseShapeError, Rejection,
    StructuralError,
};
pub use limits::{GridPolicy, PulseLimits};
pub use types::{
    AtomType, PulseRole, StimulationAtom, StimulationCommand, StimulationFunction,
    VirtualElectrodes,
};
pub use validate::{validate, CommandValidator, Validation};
