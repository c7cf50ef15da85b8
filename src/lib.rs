//! Temporarily activates keymap layers after enough pointer travel.
//!
//! [`processor`] holds the pure decision engine: it consumes relative motion,
//! key-position events and timer fires and returns the layer actions to take.
//! [`runtime`] wires an engine to a keymap and a timer under one lock.

#![cfg_attr(not(test), no_std)]

pub mod processor;
pub mod runtime;

pub use processor::{
    BindingParams, KeyPositionEvent, LayerAction, MotionSample, ProcessorConfig,
    ProcessorOutcome, ThresholdLayerProcessor,
};
pub use runtime::{CriticalSectionProcessor, LayerControl, SharedProcessor};
