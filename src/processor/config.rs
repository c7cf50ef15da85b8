use core::fmt;

use embassy_time::{Duration, Instant};
use heapless::Vec;

use super::types::{LayerId, PositionId, MAX_EXCLUDED_POSITIONS, MAX_LAYER_SLOTS};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AxisPairing {
    /// Every X or Y sample is scored on its own.
    #[default]
    PerSample,
    /// X and Y of one report are combined; the report closes on the sample
    /// flagged `sync` or once both axes are buffered.
    SyncReport,
}

/// Per-binding parameters, the three cells of a processor binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingParams {
    pub layer: LayerId,
    /// Auto-deactivation window. Zero or negative disables it.
    pub timeout_ms: i16,
    /// Accumulated distance needed to activate. Zero activates on the first
    /// sample.
    pub activation_threshold: u32,
}

impl BindingParams {
    pub const fn new(layer: LayerId, timeout_ms: i16, activation_threshold: u32) -> Self {
        Self {
            layer,
            timeout_ms,
            activation_threshold,
        }
    }

    /// Decodes raw binding cells. Each cell is truncated to the width the
    /// binding declares; a negative threshold is met by any movement.
    pub const fn from_raw(param1: u32, param2: u32, param3: u32) -> Self {
        let threshold = param3 as i32;
        Self {
            layer: param1 as LayerId,
            timeout_ms: param2 as i16,
            activation_threshold: if threshold < 0 { 0 } else { threshold as u32 },
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms as u64))
    }

    pub fn slot_index(&self) -> Option<usize> {
        let index = usize::from(self.layer);
        (index < MAX_LAYER_SLOTS).then_some(index)
    }
}

/// Const form of a processor configuration, as emitted by the config compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessorConfigSource {
    pub require_prior_idle_ms: u32,
    pub excluded_positions: &'static [PositionId],
    pub axis_pairing: AxisPairing,
    pub bindings: &'static [BindingParams],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    TooManyExcludedPositions { len: usize },
    LayerOutOfRange { layer: LayerId },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyExcludedPositions { len } => write!(
                f,
                "{len} excluded positions configured; at most {MAX_EXCLUDED_POSITIONS} are supported"
            ),
            Self::LayerOutOfRange { layer } => write!(
                f,
                "binding layer {layer} is out of range; layers must be < {MAX_LAYER_SLOTS}"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorConfig {
    require_prior_idle: Duration,
    excluded_positions: Vec<PositionId, MAX_EXCLUDED_POSITIONS>,
    axis_pairing: AxisPairing,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            require_prior_idle: Duration::from_ticks(0),
            excluded_positions: Vec::new(),
            axis_pairing: AxisPairing::PerSample,
        }
    }
}

impl ProcessorConfig {
    pub fn new(
        require_prior_idle_ms: u32,
        excluded_positions: &[PositionId],
    ) -> Result<Self, ConfigError> {
        let excluded_positions =
            Vec::from_slice(excluded_positions).map_err(|_| ConfigError::TooManyExcludedPositions {
                len: excluded_positions.len(),
            })?;
        Ok(Self {
            require_prior_idle: Duration::from_millis(u64::from(require_prior_idle_ms)),
            excluded_positions,
            axis_pairing: AxisPairing::PerSample,
        })
    }

    pub fn with_axis_pairing(mut self, axis_pairing: AxisPairing) -> Self {
        self.axis_pairing = axis_pairing;
        self
    }

    /// Builds the instance configuration and checks that every binding the
    /// source carries addresses a valid slot.
    pub fn from_source(source: &ProcessorConfigSource) -> Result<Self, ConfigError> {
        if let Some(binding) = source
            .bindings
            .iter()
            .find(|binding| binding.slot_index().is_none())
        {
            return Err(ConfigError::LayerOutOfRange {
                layer: binding.layer,
            });
        }
        Ok(Self::new(source.require_prior_idle_ms, source.excluded_positions)?
            .with_axis_pairing(source.axis_pairing))
    }

    pub fn require_prior_idle(&self) -> Duration {
        self.require_prior_idle
    }

    pub fn excluded_positions(&self) -> &[PositionId] {
        &self.excluded_positions
    }

    pub fn axis_pairing(&self) -> AxisPairing {
        self.axis_pairing
    }

    pub fn is_excluded(&self, position: PositionId) -> bool {
        self.excluded_positions.contains(&position)
    }

    /// True while a key press happened less than the required idle time ago.
    pub fn idle_gate_blocks(&self, now: Instant, last_key_press: Instant) -> bool {
        if self.require_prior_idle.as_ticks() == 0 {
            return false;
        }
        now.saturating_duration_since(last_key_press) < self.require_prior_idle
    }
}

include!(concat!(env!("OUT_DIR"), "/layer_config.rs"));

pub fn active_source() -> &'static ProcessorConfigSource {
    &PROCESSOR_CONFIG_SOURCE
}
