//! Implant driver seam.
//!
//! The implant driver owns discovery, connection management, authoritative
//! command validation, stimulation, measurement and safety interlocks. This
//! module only describes the surface the rest of the workspace talks to: the
//! [`Implant`] trait, the [`ImplantEvent`]s a driver emits, and the info
//! types it reports.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bicstim_core::{StimulationCommand, Validation};

use crate::events::EventReceiver;

// ============================================================================
// Error Types
// ============================================================================

/// Errors reported by an implant driver.
#[derive(Debug, Error)]
pub enum ImplantError {
    /// The driver refused the stimulation command
    #[error("Invalid stimulation command: {0}")]
    InvalidCommand(String),

    /// Implant power transfer is disabled
    #[error("Implant is not powered")]
    NotPowered,

    /// Measurement loop already running
    #[error("Measurement is already running")]
    MeasurementRunning,

    /// Operation needs an idle implant
    #[error("Implant is busy (measuring or stimulating)")]
    Busy,

    /// Channel index beyond the implant's channels
    #[error("Channel {channel} does not exist (implant has {channel_count} channels)")]
    InvalidChannel {
        /// Requested channel
        channel: u32,
        /// Number of channels
        channel_count: usize,
    },

    /// Error raised inside the driver
    #[error("Driver error: {0}")]
    Driver(String),
}

/// Result type for implant operations.
pub type ImplantResult<T> = Result<T, ImplantError>;

// ============================================================================
// Connection State
// ============================================================================

/// A link between two devices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    /// External unit to implant
    ExtToImplant,
    /// PC to external unit
    PcToExt,
}

/// State of a link.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Link is down
    Disconnected,
    /// Link is up
    Connected,
    /// State not known yet
    #[default]
    Unknown,
}

/// State of every link present in the hardware setup.
pub type ConnectionInfo = BTreeMap<ConnectionType, ConnectionState>;

// ============================================================================
// Implant Information
// ============================================================================

/// Electrical unit of a stimulation value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitType {
    /// No unit
    #[default]
    NoUnit,
    /// Current stimulation (µA)
    Current,
    /// Voltage stimulation (V)
    Voltage,
}

/// Capabilities of a single electrode channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel can measure
    pub can_measure: bool,
    /// Lowest measurable voltage in V
    pub measure_min_v: f64,
    /// Highest measurable voltage in V
    pub measure_max_v: f64,
    /// Channel can stimulate
    pub can_stimulate: bool,
    /// Unit of the stimulation range
    pub stimulation_unit: UnitType,
    /// Lowest stimulation value in `stimulation_unit`
    pub stim_min: f64,
    /// Highest stimulation value in `stimulation_unit`
    pub stim_max: f64,
    /// Channel can measure impedance
    pub can_measure_impedance: bool,
}

impl ChannelInfo {
    /// Channel of a BIC3232 implant.
    #[must_use]
    pub fn bic3232() -> Self {
        Self {
            can_measure: true,
            measure_min_v: -0.0075,
            measure_max_v: 0.0075,
            can_stimulate: true,
            stimulation_unit: UnitType::Current,
            stim_min: -6120.0,
            stim_max: 6120.0,
            can_measure_impedance: true,
        }
    }
}

/// Information reported by an implant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImplantInfo {
    /// Implant model, e.g. "BIC3232"
    pub device_type: String,
    /// Serial number
    pub device_id: String,
    /// Firmware version string
    pub firmware_version: String,
    /// Per-channel capabilities
    pub channels: Vec<ChannelInfo>,
    /// Measurement sampling rate in Hz
    pub sampling_rate_hz: u32,
}

impl ImplantInfo {
    /// Total number of channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of channels that can measure.
    #[must_use]
    pub fn measurement_channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.can_measure).count()
    }

    /// Number of channels that can stimulate.
    #[must_use]
    pub fn stimulation_channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.can_stimulate).count()
    }
}

// ============================================================================
// Samples
// ============================================================================

/// Measurement data of all channels at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// One value per measurement channel in V
    pub measurements: Vec<f64>,
    /// Supply voltage in mV
    pub supply_voltage_mv: u32,
    /// All channels available
    pub is_connected: bool,
    /// Id of the stimulation that starts with this sample
    pub stimulation_id: Option<u16>,
    /// Stimulation in progress
    pub stimulation_active: bool,
    /// Measurement counter, wraps at `u32::MAX`
    pub counter: u32,
}

// ============================================================================
// Events
// ============================================================================

/// Notification emitted by an implant driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ImplantEvent {
    /// Stimulation started (true) or stopped (false)
    StimulationStateChanged(bool),
    /// Measurement loop started (true) or stopped (false)
    MeasurementStateChanged(bool),
    /// Link states changed
    ConnectionStateChanged(ConnectionInfo),
    /// New samples, oldest first
    Data(Vec<Sample>),
    /// Implant supply voltage in V
    ImplantVoltageChanged(f64),
    /// Primary coil current in mA
    PrimaryCoilCurrentChanged(f64),
    /// Power control value in percent (0-100)
    ImplantControlValueChanged(f64),
    /// Capsule temperature in °C
    TemperatureChanged(f64),
    /// Capsule relative humidity in %
    HumidityChanged(f64),
    /// Error inside the driver during measurement or stimulation
    Error(String),
    /// Consumer is too slow to process data
    DataProcessingTooSlow,
    /// Number of functions and pauses finished so far in the current command
    StimulationFunctionFinished(u64),
}

impl ImplantEvent {
    /// Check if this event reports a fault.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_) | Self::DataProcessingTooSlow)
    }
}

// ============================================================================
// Implant Trait
// ============================================================================

/// Operations of an implant driver.
///
/// Events are delivered through the receiver returned by
/// [`subscribe`](Implant::subscribe). Only the latest subscriber is notified.
pub trait Implant {
    /// Information about the connected implant.
    fn implant_info(&self) -> &ImplantInfo;

    /// Register for events, replacing any previous subscriber.
    fn subscribe(&mut self) -> EventReceiver;

    /// Start the measurement loop using `reference_channels` as composite reference.
    fn start_measurement(&mut self, reference_channels: &BTreeSet<u32>) -> ImplantResult<()>;

    /// Stop the measurement loop.
    fn stop_measurement(&mut self) -> ImplantResult<()>;

    /// Measure the impedance of one channel in Ω. Blocks; needs an idle implant.
    fn impedance(&mut self, channel: u32) -> ImplantResult<f64>;

    /// Measure capsule temperature in °C. Blocks and stops a running measurement.
    fn temperature(&mut self) -> ImplantResult<f64>;

    /// Measure capsule humidity in %rh. Blocks and stops a running measurement.
    fn humidity(&mut self) -> ImplantResult<f64>;

    /// Check a command as `start_stimulation` would.
    fn is_stimulation_command_valid(&self, command: &StimulationCommand) -> Validation;

    /// Start stimulating. The driver takes ownership of the command.
    fn start_stimulation(&mut self, command: StimulationCommand) -> ImplantResult<()>;

    /// Stop stimulating.
    fn stop_stimulation(&mut self) -> ImplantResult<()>;

    /// Enable or disable power transfer to the implant.
    fn set_implant_power(&mut self, enabled: bool) -> ImplantResult<()>;

    /// Re-emit current measurement and stimulation states.
    fn push_state(&mut self) -> ImplantResult<()>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_events() {
        assert!(ImplantEvent::Error("coil".to_string()).is_error());
        assert!(ImplantEvent::DataProcessingTooSlow.is_error());
        assert!(!ImplantEvent::StimulationFunctionFinished(1).is_error());
        assert!(!ImplantEvent::TemperatureChanged(37.0).is_error());
    }

    #[test]
    fn test_channel_counts() {
        let measure_only = ChannelInfo {
            can_stimulate: false,
            stimulation_unit: UnitType::NoUnit,
            stim_min: 0.0,
            stim_max: 0.0,
            ..ChannelInfo::bic3232()
        };
        let info = ImplantInfo {
            device_type: "BIC3232".to_string(),
            device_id: "X".to_string(),
            firmware_version: "1".to_string(),
            channels: vec![ChannelInfo::bic3232(), ChannelInfo::bic3232(), measure_only],
            sampling_rate_hz: 1000,
        };

        assert_eq!(info.channel_count(), 3);
        assert_eq!(info.measurement_channel_count(), 3);
        assert_eq!(info.stimulation_channel_count(), 2);
    }
}
