//! Host integration for a [`ThresholdLayerProcessor`].
//!
//! Motion, key and timer callbacks may arrive from different execution
//! contexts, so one instance keeps processor, timer deadlines and the layer
//! collaborator behind a single blocking mutex. Actions are applied while the
//! lock is held so layer commands reach the keymap in the order they were
//! decided.

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::{
    blocking_mutex::{
        raw::{CriticalSectionRawMutex, RawMutex},
        Mutex,
    },
    signal::Signal,
};
use embassy_time::{Instant, Timer};

use crate::processor::{
    BindingParams, KeyPositionEvent, LayerAction, LayerId, MotionSample, ProcessorOutcome,
    ProcessorOutput, ThresholdLayerProcessor,
};

mod timeouts;

pub use timeouts::TimeoutQueue;

/// The keymap's layer state. Both calls must tolerate repeats.
pub trait LayerControl {
    fn activate(&mut self, layer: LayerId);
    fn deactivate(&mut self, layer: LayerId);
}

struct Inner<L> {
    processor: ThresholdLayerProcessor,
    timeouts: TimeoutQueue,
    layers: L,
}

impl<L: LayerControl> Inner<L> {
    /// Returns true when the deadline set changed.
    fn apply(&mut self, now: Instant, output: &ProcessorOutput) -> bool {
        let mut timers_changed = false;
        for action in output.actions.iter() {
            match *action {
                LayerAction::Activate(layer) => self.layers.activate(layer),
                LayerAction::Deactivate(layer) => self.layers.deactivate(layer),
                LayerAction::ArmTimeout { token, after } => {
                    let deadline = now.checked_add(after).unwrap_or(Instant::MAX);
                    self.timeouts.arm(token, deadline);
                    timers_changed = true;
                }
                LayerAction::CancelTimeout(token) => {
                    timers_changed |= self.timeouts.cancel(token);
                }
            }
        }
        timers_changed
    }
}

pub struct SharedProcessor<M: RawMutex, L> {
    inner: Mutex<M, RefCell<Inner<L>>>,
    timers_changed: Signal<M, ()>,
}

pub type CriticalSectionProcessor<L> = SharedProcessor<CriticalSectionRawMutex, L>;

impl<M: RawMutex, L: LayerControl> SharedProcessor<M, L> {
    pub fn new(processor: ThresholdLayerProcessor, layers: L) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                processor,
                timeouts: TimeoutQueue::new(),
                layers,
            })),
            timers_changed: Signal::new(),
        }
    }

    pub fn handle_motion(&self, binding: &BindingParams, sample: MotionSample) -> ProcessorOutcome {
        self.handle_motion_at(Instant::now(), binding, sample)
    }

    pub fn handle_motion_at(
        &self,
        now: Instant,
        binding: &BindingParams,
        sample: MotionSample,
    ) -> ProcessorOutcome {
        self.dispatch(now, |processor| {
            processor.handle_motion(now, binding, sample)
        })
    }

    pub fn handle_key(&self, event: KeyPositionEvent) -> ProcessorOutcome {
        self.handle_key_at(Instant::now(), event)
    }

    pub fn handle_key_at(&self, now: Instant, event: KeyPositionEvent) -> ProcessorOutcome {
        self.dispatch(now, |processor| processor.handle_key(now, event))
    }

    /// Delivers every timer due at `now`. Returns how many fired.
    pub fn fire_expired_at(&self, now: Instant) -> usize {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let mut fired = 0;
            while let Some(token) = inner.timeouts.pop_expired(now) {
                let output = inner.processor.on_timeout(token);
                inner.apply(now, &output);
                fired += 1;
            }
            fired
        })
    }

    /// Drives auto-deactivation. Spawn once per instance; it never returns.
    pub async fn run_timeouts(&self) {
        loop {
            match self.next_deadline() {
                Some(deadline) => {
                    if let Either::First(()) =
                        select(Timer::at(deadline), self.timers_changed.wait()).await
                    {
                        let fired = self.fire_expired_at(Instant::now());
                        log::trace!("threshold_layer: timeouts fired={}", fired);
                    }
                }
                None => self.timers_changed.wait().await,
            }
        }
    }

    pub fn with_processor<R>(&self, f: impl FnOnce(&ThresholdLayerProcessor) -> R) -> R {
        self.inner.lock(|cell| f(&cell.borrow().processor))
    }

    pub fn with_layers<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut().layers))
    }

    pub fn pending_timeouts(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().timeouts.len())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.lock(|cell| cell.borrow().timeouts.next_deadline())
    }

    fn dispatch(
        &self,
        now: Instant,
        handler: impl FnOnce(&mut ThresholdLayerProcessor) -> ProcessorOutput,
    ) -> ProcessorOutcome {
        let (outcome, timers_changed) = self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let output = handler(&mut inner.processor);
            let timers_changed = inner.apply(now, &output);
            (output.outcome, timers_changed)
        });
        if timers_changed {
            self.timers_changed.signal(());
        }
        outcome
    }
}
