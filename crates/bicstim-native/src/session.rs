//! Pre-checked submission of stimulation commands.
//!
//! A [`StimulationSession`] wraps an [`Implant`] and runs the local
//! [`CommandValidator`] before the driver sees a command. Commands that fail
//! either the local check or the driver's own check are handed back to the
//! caller inside the error.

use thiserror::Error;
use tracing::{debug, info, warn};

use bicstim_core::{CommandValidator, PulseLimits, Rejection, StimulationCommand, Validation};

use crate::implant::{Implant, ImplantError};

/// Errors from submitting a command.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Local pre-check failed; the driver was not called
    #[error("Command rejected before submission: {rejection}")]
    Rejected {
        /// Why the command was rejected
        rejection: Rejection,
        /// The rejected command
        command: Box<StimulationCommand>,
    },

    /// Driver's validation refused the command
    #[error("Command rejected by driver: {reason}")]
    DriverRejected {
        /// Reason reported by the driver
        reason: String,
        /// The rejected command
        command: Box<StimulationCommand>,
    },

    /// Driver failed to start the stimulation
    #[error(transparent)]
    Implant(#[from] ImplantError),
}

impl SessionError {
    /// Take back the command if it never reached the driver.
    #[must_use]
    pub fn into_command(self) -> Option<StimulationCommand> {
        match self {
            Self::Rejected { command, .. } | Self::DriverRejected { command, .. } => Some(*command),
            Self::Implant(_) => None,
        }
    }
}

/// Implant wrapper that pre-checks every command.
#[derive(Debug)]
pub struct StimulationSession<I: Implant> {
    implant: I,
    validator: CommandValidator,
}

impl<I: Implant> StimulationSession<I> {
    /// Wrap an implant using the given limits for the pre-check.
    #[must_use]
    pub const fn new(implant: I, limits: PulseLimits) -> Self {
        Self { implant, validator: CommandValidator::new(limits) }
    }

    /// Validator used for the pre-check.
    #[must_use]
    pub const fn validator(&self) -> &CommandValidator {
        &self.validator
    }

    /// Borrow the wrapped implant.
    #[must_use]
    pub const fn implant(&self) -> &I {
        &self.implant
    }

    /// Mutably borrow the wrapped implant.
    pub fn implant_mut(&mut self) -> &mut I {
        &mut self.implant
    }

    /// Unwrap the implant.
    pub fn into_inner(self) -> I {
        self.implant
    }

    /// Run only the local pre-check.
    #[must_use]
    pub fn precheck(&self, command: &StimulationCommand) -> Validation {
        self.validator.validate(command)
    }

    /// Validate `command` locally, then with the driver, then start it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] or [`SessionError::DriverRejected`]
    /// with the command if a check fails, or [`SessionError::Implant`] if
    /// the driver could not start the stimulation.
    pub fn submit(&mut self, command: StimulationCommand) -> Result<(), SessionError> {
        if let Err(rejection) = self.validator.check(&command) {
            warn!(
                command = command.name(),
                tracing_id = command.tracing_id(),
                category = rejection.category(),
                "Pre-check rejected command: {}",
                rejection
            );
            return Err(SessionError::Rejected { rejection, command: Box::new(command) });
        }

        let driver = self.implant.is_stimulation_command_valid(&command);
        if !driver.valid {
            warn!(
                command = command.name(),
                tracing_id = command.tracing_id(),
                "Driver rejected command: {}",
                driver.reason
            );
            return Err(SessionError::DriverRejected {
                reason: driver.reason,
                command: Box::new(command),
            });
        }

        debug!(tracing_id = command.tracing_id(), "Command passed both checks");
        let tracing_id = command.tracing_id();
        self.implant.start_stimulation(command)?;
        info!(tracing_id, "Stimulation submitted");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
