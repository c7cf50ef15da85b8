use statig::prelude::*;

use super::{
    config::{AxisPairing, BindingParams},
    distance::PendingDeltas,
    types::{
        ActionBuffer, LayerAction, LayerId, ProcessorOutcome, ProcessorOutput, RelativeAxis,
        TimerToken,
    },
};

mod engine;

pub use engine::ThresholdLayerProcessor;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub accumulated_distance: u32,
    pub active: bool,
    pub pending_timer: Option<TimerToken>,
}

#[derive(Clone, Copy, Debug)]
enum SlotEvent {
    Motion {
        axis: RelativeAxis,
        delta: i32,
        sync: bool,
        pairing: AxisPairing,
        binding: BindingParams,
    },
    Timeout {
        token: TimerToken,
    },
    KeyReset,
}

#[derive(Default)]
struct DispatchContext {
    actions: ActionBuffer,
    outcome: ProcessorOutcome,
}

impl DispatchContext {
    fn finish(self) -> ProcessorOutput {
        ProcessorOutput {
            actions: self.actions,
            outcome: self.outcome,
        }
    }
}

struct SlotHsm {
    layer: LayerId,
    generation: u32,
    pending: PendingDeltas,
    snapshot: SlotSnapshot,
}

impl SlotHsm {
    fn new(layer: LayerId) -> Self {
        Self {
            layer,
            generation: 0,
            pending: PendingDeltas::new(),
            snapshot: SlotSnapshot::default(),
        }
    }

    fn arm_timeout(&mut self, context: &mut DispatchContext, binding: &BindingParams) {
        let Some(after) = binding.timeout() else {
            return;
        };
        self.generation = self.generation.wrapping_add(1);
        let token = TimerToken {
            layer: self.layer,
            generation: self.generation,
        };
        self.snapshot.pending_timer = Some(token);
        context.actions.push(LayerAction::ArmTimeout { token, after });
    }

    fn deactivate(&mut self, context: &mut DispatchContext) {
        log::debug!(
            "threshold_layer: deactivate layer={} distance={}",
            self.layer,
            self.snapshot.accumulated_distance
        );
        self.snapshot = SlotSnapshot::default();
        self.pending.clear();
        context.actions.push(LayerAction::Deactivate(self.layer));
    }
}

#[state_machine(initial = "State::inactive()")]
impl SlotHsm {
    #[state]
    fn inactive(&mut self, context: &mut DispatchContext, event: &SlotEvent) -> Outcome<State> {
        match event {
            SlotEvent::Motion {
                axis,
                delta,
                sync,
                pairing,
                binding,
            } => {
                let Some(distance) = self.pending.record(*axis, *delta, *sync, *pairing) else {
                    context.outcome = ProcessorOutcome::AwaitingPair;
                    return Handled;
                };
                self.snapshot.accumulated_distance =
                    self.snapshot.accumulated_distance.saturating_add(distance);
                if self.snapshot.accumulated_distance < binding.activation_threshold {
                    context.outcome = ProcessorOutcome::Accumulated;
                    return Handled;
                }

                log::debug!(
                    "threshold_layer: activate layer={} distance={} threshold={}",
                    self.layer,
                    self.snapshot.accumulated_distance,
                    binding.activation_threshold
                );
                self.snapshot.active = true;
                context.actions.push(LayerAction::Activate(self.layer));
                self.arm_timeout(context, binding);
                context.outcome = ProcessorOutcome::Activated;
                Transition(State::active())
            }
            SlotEvent::Timeout { token } => {
                log::trace!(
                    "threshold_layer: stale timeout layer={} generation={}",
                    token.layer,
                    token.generation
                );
                context.outcome = ProcessorOutcome::StaleTimeout;
                Handled
            }
            SlotEvent::KeyReset => Handled,
        }
    }

    #[state]
    fn active(&mut self, context: &mut DispatchContext, event: &SlotEvent) -> Outcome<State> {
        match event {
            SlotEvent::Motion {
                axis,
                delta,
                sync,
                pairing,
                binding,
            } => {
                // Keep the pairing buffer aligned with the report stream; the
                // distance itself no longer matters until the next reset.
                let _ = self.pending.record(*axis, *delta, *sync, *pairing);
                self.arm_timeout(context, binding);
                context.outcome = ProcessorOutcome::Refreshed;
                Handled
            }
            SlotEvent::Timeout { token } => {
                if self.snapshot.pending_timer != Some(*token) {
                    log::trace!(
                        "threshold_layer: stale timeout layer={} generation={}",
                        token.layer,
                        token.generation
                    );
                    context.outcome = ProcessorOutcome::StaleTimeout;
                    return Handled;
                }
                self.deactivate(context);
                context.outcome = ProcessorOutcome::TimedOut;
                Transition(State::inactive())
            }
            SlotEvent::KeyReset => {
                if let Some(token) = self.snapshot.pending_timer {
                    context.actions.push(LayerAction::CancelTimeout(token));
                }
                self.deactivate(context);
                Transition(State::inactive())
            }
        }
    }
}
