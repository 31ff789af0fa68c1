//! bicstim native - Host side of the stimulation pre-check
//!
//! This crate connects the `no_std` command model to an implant driver:
//! - The [`Implant`] driver seam and the events it emits
//! - Single-subscriber event dispatch over a tokio channel
//! - A simulated BIC3232 for running commands without hardware
//! - Sessions that pre-check commands before the driver sees them
//! - JSON command and limits files
//!
//! # Modules
//!
//! - [`implant`]: Driver trait, events and implant information
//! - [`events`]: Event dispatch
//! - [`simulated`]: Simulated implant
//! - [`session`]: Pre-checked command submission
//! - [`io`]: Command files

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod events;
pub mod implant;
pub mod io;
pub mod session;
pub mod simulated;

// Re-export key types
pub use events::{EventBus, EventReceiver};
pub use implant::{
    ChannelInfo, ConnectionInfo, ConnectionState, ConnectionType, Implant, ImplantError,
    ImplantEvent, ImplantInfo, ImplantResult, Sample, UnitType,
};
pub use io::{example_command, load_command, load_limits, CommandFileError};
pub use session::{SessionError, StimulationSession};
pub use simulated::SimulatedImplant;
