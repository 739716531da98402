//! Service configuration.
//!
//! Everything has a sensible default; deployments that need different ports
//! or settle timings point `ROVERCAM_CONFIG` at a small YAML file.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::actuator::SettleDelays;
use crate::encoder::DEFAULT_JPEG_QUALITY;
use crate::{Result, RoverError};

/// Configuration for the rover camera service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address both listeners bind to.
    pub bind_addr: IpAddr,

    /// Port of the control listener (`/`, `/status`, `/control`,
    /// `/capture`). The stream listener always binds one port above.
    pub control_port: u16,

    /// JPEG quality used when transcoding raw frames.
    pub stream_quality: u8,

    /// Settle delay after Forward/Backward commands, in milliseconds.
    pub settle_drive_ms: u64,

    /// Settle delay after turn commands, in milliseconds.
    pub settle_turn_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            control_port: 8080,
            stream_quality: DEFAULT_JPEG_QUALITY,
            settle_drive_ms: 200,
            settle_turn_ms: 100,
        }
    }
}

impl ServerConfig {
    /// Port of the dedicated stream listener: control port + 1.
    pub fn stream_port(&self) -> u16 {
        self.control_port.saturating_add(1)
    }

    /// Settle delays in the actuator's terms.
    pub fn settle_delays(&self) -> SettleDelays {
        SettleDelays {
            drive: Duration::from_millis(self.settle_drive_ms),
            turn: Duration::from_millis(self.settle_turn_ms),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RoverError::io(format!("read config {}", path.display()), e))?;
        let config: Self =
            serde_yaml_ng::from_str(&text).map_err(|e| RoverError::config(path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the listeners cannot realize.
    pub fn validate(&self) -> Result<()> {
        if self.control_port == u16::MAX {
            return Err(RoverError::config(
                "control_port",
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "no room for the stream port above the control port",
                ),
            ));
        }
        Ok(())
    }
}
