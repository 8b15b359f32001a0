//! Trigger configuration as an ordered sequence of node writes.
//!
//! Trigger mode is always switched off before source or activation are
//! touched, and switched back on last. A configuration that cannot be applied
//! leaves the trigger mode off.

use crate::{CameraDevice, ConfigError};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    Off,
    Hardware,
    Software,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Off => write!(f, "off"),
            TriggerMode::Hardware => write!(f, "hardware"),
            TriggerMode::Software => write!(f, "software"),
        }
    }
}

impl FromStr for TriggerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(TriggerMode::Off),
            "hardware" => Ok(TriggerMode::Hardware),
            "software" => Ok(TriggerMode::Software),
            _ => Err(ConfigError::UnsupportedMode(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerSource {
    Software,
    Line0,
    Line1,
    Line2,
    Line3,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Software => write!(f, "Software"),
            TriggerSource::Line0 => write!(f, "Line0"),
            TriggerSource::Line1 => write!(f, "Line1"),
            TriggerSource::Line2 => write!(f, "Line2"),
            TriggerSource::Line3 => write!(f, "Line3"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerActivation {
    RisingEdge,
    FallingEdge,
    AnyEdge,
    LevelHigh,
    LevelLow,
}

/// A single trigger node write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeWrite {
    ModeOff,
    ModeOn,
    Source(TriggerSource),
    Activation(TriggerActivation),
}

impl NodeWrite {
    /// GenICam node name.
    pub fn node(&self) -> &'static str {
        match self {
            NodeWrite::ModeOff | NodeWrite::ModeOn => "TriggerMode",
            NodeWrite::Source(_) => "TriggerSource",
            NodeWrite::Activation(_) => "TriggerActivation",
        }
    }
}

/// Requested trigger setup. Immutable once built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerConfig {
    mode: TriggerMode,
    source: TriggerSource,
    activation: TriggerActivation,
}

impl TriggerConfig {
    /// External trigger on Line2, rising edge.
    pub fn hardware() -> Self {
        Self {
            mode: TriggerMode::Hardware,
            source: TriggerSource::Line2,
            activation: TriggerActivation::RisingEdge,
        }
    }

    pub fn software() -> Self {
        Self {
            mode: TriggerMode::Software,
            source: TriggerSource::Software,
            activation: TriggerActivation::RisingEdge,
        }
    }

    pub fn off() -> Self {
        Self {
            mode: TriggerMode::Off,
            source: TriggerSource::Software,
            activation: TriggerActivation::RisingEdge,
        }
    }

    /// Preset for a mode.
    pub fn for_mode(mode: TriggerMode) -> Self {
        match mode {
            TriggerMode::Off => Self::off(),
            TriggerMode::Hardware => Self::hardware(),
            TriggerMode::Software => Self::software(),
        }
    }

    pub fn with_source(mut self, source: TriggerSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_activation(mut self, activation: TriggerActivation) -> Self {
        self.activation = activation;
        self
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    pub fn source(&self) -> TriggerSource {
        self.source
    }

    pub fn activation(&self) -> TriggerActivation {
        self.activation
    }

    /// The node writes that apply this configuration, in order.
    pub fn plan(&self) -> Result<Vec<NodeWrite>, ConfigError> {
        match self.mode {
            TriggerMode::Off => Ok(vec![NodeWrite::ModeOff]),
            TriggerMode::Software => {
                if self.source != TriggerSource::Software {
                    return Err(self.invalid_source());
                }
                Ok(vec![
                    NodeWrite::ModeOff,
                    NodeWrite::Source(self.source),
                    NodeWrite::ModeOn,
                ])
            }
            TriggerMode::Hardware => {
                if self.source == TriggerSource::Software {
                    return Err(self.invalid_source());
                }
                Ok(vec![
                    NodeWrite::ModeOff,
                    NodeWrite::Source(self.source),
                    NodeWrite::Activation(self.activation),
                    NodeWrite::ModeOn,
                ])
            }
        }
    }

    fn invalid_source(&self) -> ConfigError {
        ConfigError::InvalidSource {
            mode: self.mode.to_string(),
            source: self.source.to_string(),
        }
    }
}

/// Apply `config` to `device`.
///
/// On any failure the trigger mode is switched off (best effort) before the
/// error is returned, so the device is never left half configured.
pub fn apply(device: &mut dyn CameraDevice, config: &TriggerConfig) -> Result<(), ConfigError> {
    let plan = match config.plan() {
        Ok(plan) => plan,
        Err(error) => {
            if let Err(reset) = device.write_trigger_node(NodeWrite::ModeOff) {
                log::error!("trigger: failed to reset trigger mode after error: {}", reset);
            }
            return Err(error);
        }
    };

    for write in plan {
        if let Err(error) = device.write_trigger_node(write) {
            if write != NodeWrite::ModeOff {
                if let Err(reset) = device.write_trigger_node(NodeWrite::ModeOff) {
                    log::error!("trigger: failed to reset trigger mode after error: {}", reset);
                }
            }
            return Err(error);
        }
    }

    log::info!(
        "trigger: {} mode (source {}, activation {:?})",
        config.mode(),
        config.source(),
        config.activation()
    );
    Ok(())
}
