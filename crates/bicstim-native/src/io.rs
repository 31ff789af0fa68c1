//! JSON command and limits files.
//!
//! Commands read from disk bypass the composition checks of
//! [`StimulationFunction::append`] and friends, so they must go through the
//! validator before submission.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use bicstim_core::{CompositionError, PulseLimits, StimulationAtom, StimulationCommand, StimulationFunction};

/// Errors reading or writing command files.
#[derive(Debug, Error)]
pub enum CommandFileError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// File content is not valid JSON for the expected type
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// Value could not be rendered as JSON
    #[error("Failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CommandFileError> {
    let content = fs::read_to_string(path)
        .map_err(|source| CommandFileError::Read { path: path.to_path_buf(), source })?;
    let value = serde_json::from_str(&content)
        .map_err(|source| CommandFileError::Parse { path: path.to_path_buf(), source })?;
    debug!(path = %path.display(), "Loaded JSON file");
    Ok(value)
}

/// Read a stimulation command from a JSON file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
pub fn load_command(path: impl AsRef<Path>) -> Result<StimulationCommand, CommandFileError> {
    load_json(path.as_ref())
}

/// Read pulse limits from a JSON file. Missing fields keep their BIC3232 values.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
pub fn load_limits(path: impl AsRef<Path>) -> Result<PulseLimits, CommandFileError> {
    load_json(path.as_ref())
}

/// Parse a stimulation command from a JSON string.
///
/// # Errors
///
/// Fails if the string is not a valid command document.
pub fn command_from_str(json: &str) -> Result<StimulationCommand, serde_json::Error> {
    serde_json::from_str(json)
}

/// Render a command as pretty-printed JSON.
///
/// # Errors
///
/// Fails only if serialization itself fails.
pub fn to_json(command: &StimulationCommand) -> Result<String, CommandFileError> {
    Ok(serde_json::to_string_pretty(command)?)
}

/// A valid command: ten charge-balanced pulses followed by a 30 ms pause.
///
/// # Errors
///
/// Never fails for the built-in values; the error comes from composition.
pub fn example_command() -> Result<StimulationCommand, CompositionError> {
    let mut pulse = StimulationFunction::new("PulseExample");
    for (amplitude_ua, duration_us) in [(-1200, 400), (0, 100), (300, 1600), (0, 100), (0, 800)] {
        pulse.append(StimulationAtom::rect4(amplitude_ua, duration_us))?;
    }
    pulse.set_repetitions(10)?;
    pulse.set_virtual_electrodes([0], [1], false)?;

    let mut pause = StimulationFunction::new("PauseExample");
    pause.append(StimulationAtom::pause(30_000))?;
    pause.set_virtual_electrodes([0], [1], false)?;

    let mut command = StimulationCommand::new("Example");
    command.set_tracing_id(1);
    command.append(pulse)?;
    command.append(pause)?;
    Ok(command)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bicstim_core::{validate, GridPolicy};
    use tempfile::tempdir;

    #[test]
    fn test_example_command_is_valid() {
        let command = example_command().unwrap();
        let result = validate(&command);
        assert!(result.valid, "{}", result.reason);
        assert_eq!(command.size(), 2);
        assert_eq!(command.duration_us(), 10 * 3000 + 30_000);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("command.json");
        let command = example_command().unwrap();

        fs::write(&path, to_json(&command).unwrap()).unwrap();
        assert_eq!(load_command(&path).unwrap(), command);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = load_command(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, CommandFileError::Read { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "functions": [{ "atoms": [{ "type": "sine" }] }] }"#).unwrap();
        assert!(matches!(load_command(&path), Err(CommandFileError::Parse { .. })));
    }

    #[test]
    fn test_partial_limits_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("limits.json");
        fs::write(&path, r#"{ "channel_count": 16, "grid": "range_only" }"#).unwrap();

        let limits = load_limits(&path).unwrap();
        assert_eq!(limits.channel_count, 16);
        assert_eq!(limits.grid, GridPolicy::RangeOnly);
        assert_eq!(limits.main_amplitude_min_ua, PulseLimits::BIC3232.main_amplitude_min_ua);
    }

    #[test]
    fn test_command_from_str_defaults() {
        let command = command_from_str(
            r#"{ "functions": [{ "atoms": [{ "type": "pause", "duration_us": 80 }],
                 "electrodes": { "sources": [2], "destinations": [], "use_ground": true } }] }"#,
        )
        .unwrap();
        assert_eq!(command.repetitions(), 1);
        assert_eq!(command.functions()[0].repetitions(), 1);
        assert!(command.functions()[0].uses_ground_electrode());
        assert!(validate(&command).valid);
    }
}
