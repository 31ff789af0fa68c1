//! In-process stand-in for an implant driver.
//!
//! [`SimulatedImplant`] behaves like a powered, connected BIC3232 without any
//! hardware. Stimulation completes immediately: starting a command emits the
//! start event, one `StimulationFunctionFinished` per executed function, and
//! the stop event. Measurement samples are produced on demand with
//! [`SimulatedImplant::acquire`].

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use bicstim_core::{CommandValidator, PulseLimits, StimulationCommand, Validation};

use crate::events::{EventBus, EventReceiver};
use crate::implant::{
    ChannelInfo, ConnectionInfo, ConnectionState, ConnectionType, Implant, ImplantError,
    ImplantEvent, ImplantInfo, ImplantResult, Sample,
};

/// Simulated BIC3232 implant.
#[derive(Debug)]
pub struct SimulatedImplant {
    info: ImplantInfo,
    events: EventBus,
    validator: CommandValidator,
    powered: bool,
    measuring: bool,
    stimulating: bool,
    reference_channels: BTreeSet<u32>,
    sample_counter: u32,
    stimulation_count: u16,
    pending_stimulation_id: Option<u16>,
    temperature_c: f64,
    humidity_rh: f64,
    last_command: Option<StimulationCommand>,
}

impl SimulatedImplant {
    /// Supply voltage reported in samples (mV)
    const SUPPLY_VOLTAGE_MV: u32 = 3300;

    /// Create a simulated implant with the given info and limits.
    #[must_use]
    pub fn new(info: ImplantInfo, limits: PulseLimits) -> Self {
        Self {
            info,
            events: EventBus::new(),
            validator: CommandValidator::new(limits),
            powered: true,
            measuring: false,
            stimulating: false,
            reference_channels: BTreeSet::new(),
            sample_counter: 0,
            stimulation_count: 0,
            pending_stimulation_id: None,
            temperature_c: 37.0,
            humidity_rh: 20.0,
            last_command: None,
        }
    }

    /// Simulated BIC3232 with 32 channels at 1 kHz.
    #[must_use]
    pub fn bic3232() -> Self {
        let info = ImplantInfo {
            device_type: "BIC3232".to_string(),
            device_id: "SIM-0001".to_string(),
            firmware_version: "sim".to_string(),
            channels: vec![ChannelInfo::bic3232(); 32],
            sampling_rate_hz: 1000,
        };
        Self::new(info, PulseLimits::BIC3232)
    }

    /// Check if the measurement loop is running.
    #[must_use]
    pub const fn is_measuring(&self) -> bool {
        self.measuring
    }

    /// Check if a stimulation is in progress.
    #[must_use]
    pub const fn is_stimulating(&self) -> bool {
        self.stimulating
    }

    /// Check if power transfer is enabled.
    #[must_use]
    pub const fn is_powered(&self) -> bool {
        self.powered
    }

    /// Reference channels of the running measurement.
    #[must_use]
    pub fn reference_channels(&self) -> &BTreeSet<u32> {
        &self.reference_channels
    }

    /// Last command accepted by [`Implant::start_stimulation`].
    #[must_use]
    pub fn last_command(&self) -> Option<&StimulationCommand> {
        self.last_command.as_ref()
    }

    /// Number of stimulations run so far.
    #[must_use]
    pub const fn stimulation_count(&self) -> u16 {
        self.stimulation_count
    }

    /// Produce `count` samples and emit them as one [`ImplantEvent::Data`].
    ///
    /// # Errors
    ///
    /// Fails if the measurement loop is not running.
    pub fn acquire(&mut self, count: usize) -> ImplantResult<Vec<Sample>> {
        if !self.measuring {
            return Err(ImplantError::Driver("measurement is not running".to_string()));
        }

        let channels = self.info.measurement_channel_count();
        let samples: Vec<Sample> = (0..count).map(|_| self.next_sample(channels)).collect();
        self.events.emit(ImplantEvent::Data(samples.clone()));
        Ok(samples)
    }

    fn next_sample(&mut self, channels: usize) -> Sample {
        let counter = self.sample_counter;
        self.sample_counter = self.sample_counter.wrapping_add(1);

        let measurements = (0..channels)
            .map(|channel| {
                let is_reference = u32::try_from(channel)
                    .is_ok_and(|c| self.reference_channels.contains(&c));
                if is_reference {
                    0.0
                } else {
                    // Deterministic µV-range waveform per channel
                    let phase = f64::from(counter % 1000) / 1000.0 + channel as f64 * 0.1;
                    (phase * std::f64::consts::TAU).sin() * 50e-6
                }
            })
            .collect();

        Sample {
            measurements,
            supply_voltage_mv: Self::SUPPLY_VOLTAGE_MV,
            is_connected: self.powered,
            stimulation_id: self.pending_stimulation_id.take(),
            stimulation_active: self.stimulating,
            counter,
        }
    }

    fn connection_info(&self) -> ConnectionInfo {
        let implant_state = if self.powered {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        ConnectionInfo::from([
            (ConnectionType::PcToExt, ConnectionState::Connected),
            (ConnectionType::ExtToImplant, implant_state),
        ])
    }

    fn check_channel(&self, channel: u32) -> ImplantResult<()> {
        let channel_count = self.info.channel_count();
        if usize::try_from(channel).map_or(true, |c| c >= channel_count) {
            return Err(ImplantError::InvalidChannel { channel, channel_count });
        }
        Ok(())
    }

    fn require_power(&self) -> ImplantResult<()> {
        if self.powered {
            Ok(())
        } else {
            Err(ImplantError::NotPowered)
        }
    }

    fn halt_measurement(&mut self) {
        if self.measuring {
            self.measuring = false;
            self.events.emit(ImplantEvent::MeasurementStateChanged(false));
        }
    }
}

impl Default for SimulatedImplant {
    fn default() -> Self {
        Self::bic3232()
    }
}

impl Implant for SimulatedImplant {
    fn implant_info(&self) -> &ImplantInfo {
        &self.info
    }

    fn subscribe(&mut self) -> EventReceiver {
        self.events.subscribe()
    }

    fn start_measurement(&mut self, reference_channels: &BTreeSet<u32>) -> ImplantResult<()> {
        self.require_power()?;
        if self.measuring {
            return Err(ImplantError::MeasurementRunning);
        }
        for &channel in reference_channels {
            self.check_channel(channel)?;
        }

        self.reference_channels = reference_channels.clone();
        self.measuring = true;
        info!(references = ?self.reference_channels, "Measurement started");
        self.events.emit(ImplantEvent::MeasurementStateChanged(true));
        Ok(())
    }

    fn stop_measurement(&mut self) -> ImplantResult<()> {
        self.halt_measurement();
        Ok(())
    }

    fn impedance(&mut self, channel: u32) -> ImplantResult<f64> {
        self.require_power()?;
        self.check_channel(channel)?;
        if self.measuring || self.stimulating {
            return Err(ImplantError::Busy);
        }
        Ok(1_000.0 + f64::from(channel) * 25.0)
    }

    fn temperature(&mut self) -> ImplantResult<f64> {
        self.require_power()?;
        self.halt_measurement();
        self.events.emit(ImplantEvent::TemperatureChanged(self.temperature_c));
        Ok(self.temperature_c)
    }

    fn humidity(&mut self) -> ImplantResult<f64> {
        self.require_power()?;
        self.halt_measurement();
        self.events.emit(ImplantEvent::HumidityChanged(self.humidity_rh));
        Ok(self.humidity_rh)
    }

    fn is_stimulation_command_valid(&self, command: &StimulationCommand) -> Validation {
        self.validator.validate(command)
    }

    fn start_stimulation(&mut self, command: StimulationCommand) -> ImplantResult<()> {
        self.require_power()?;
        if let Err(rejection) = self.validator.check(&command) {
            warn!(tracing_id = command.tracing_id(), "Simulated driver rejected command: {}", rejection);
            return Err(ImplantError::InvalidCommand(rejection.to_string()));
        }

        self.stimulation_count = self.stimulation_count.wrapping_add(1);
        self.pending_stimulation_id = Some(self.stimulation_count);
        self.stimulating = true;
        info!(
            command = command.name(),
            tracing_id = command.tracing_id(),
            duration_us = command.duration_us(),
            "Stimulation started"
        );
        self.events.emit(ImplantEvent::StimulationStateChanged(true));

        for finished in 1..=command.size() {
            self.events.emit(ImplantEvent::StimulationFunctionFinished(finished));
        }

        self.stimulating = false;
        self.events.emit(ImplantEvent::StimulationStateChanged(false));
        debug!(tracing_id = command.tracing_id(), "Stimulation finished");

        self.last_command = Some(command);
        Ok(())
    }

    fn stop_stimulation(&mut self) -> ImplantResult<()> {
        self.require_power()?;
        if self.stimulating {
            self.stimulating = false;
            self.events.emit(ImplantEvent::StimulationStateChanged(false));
        }
        Ok(())
    }

    fn set_implant_power(&mut self, enabled: bool) -> ImplantResult<()> {
        if self.powered == enabled {
            return Ok(());
        }
        if !enabled {
            self.halt_measurement();
            self.stimulating = false;
        }
        self.powered = enabled;
        info!(enabled, "Implant power changed");
        self.events.emit(ImplantEvent::ConnectionStateChanged(self.connection_info()));
        Ok(())
    }

    fn push_state(&mut self) -> ImplantResult<()> {
        self.events.emit(ImplantEvent::MeasurementStateChanged(self.measuring));
        self.events.emit(ImplantEvent::StimulationStateChanged(self.stimulating));
        self.events.emit(ImplantEvent::ConnectionStateChanged(self.connection_info()));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
