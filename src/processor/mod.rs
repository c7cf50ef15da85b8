pub mod config;
pub mod distance;
mod slot_hsm;
pub mod types;

pub use config::{
    active_source, AxisPairing, BindingParams, ConfigError, ProcessorConfig,
    ProcessorConfigSource,
};
pub use distance::approximate_distance;
pub use slot_hsm::{SlotSnapshot, ThresholdLayerProcessor};
pub use types::{
    ActionBuffer, KeyPositionEvent, LayerAction, LayerId, MotionSample, PositionId,
    ProcessorOutcome, ProcessorOutput, RelativeAxis, TimerToken, MAX_EXCLUDED_POSITIONS,
    MAX_LAYER_SLOTS,
};
