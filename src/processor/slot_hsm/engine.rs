use embassy_time::Instant;
use statig::blocking::IntoStateMachineExt as _;

use super::{DispatchContext, SlotEvent, SlotHsm, SlotSnapshot};
use crate::processor::{
    config::{active_source, BindingParams, ConfigError, ProcessorConfig},
    types::{
        KeyPositionEvent, LayerId, MotionSample, ProcessorOutcome, ProcessorOutput, TimerToken,
        MAX_LAYER_SLOTS,
    },
};

/// Motion-gated temporary layer activation for one processor instance.
///
/// Handlers are synchronous and never fail; every call returns the layer and
/// timer actions the host must carry out, in order. Callers sharing one
/// instance across execution contexts must serialize calls; see
/// [`crate::runtime::SharedProcessor`].
pub struct ThresholdLayerProcessor {
    config: ProcessorConfig,
    last_key_press: Instant,
    slots: [statig::blocking::StateMachine<SlotHsm>; MAX_LAYER_SLOTS],
}

impl Default for ThresholdLayerProcessor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}

impl ThresholdLayerProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            // The idle clock starts at boot.
            last_key_press: Instant::from_ticks(0),
            slots: core::array::from_fn(|index| SlotHsm::new(index as LayerId).state_machine()),
        }
    }

    /// Builds a processor from the configuration compiled into the crate.
    pub fn from_active_source() -> Result<Self, ConfigError> {
        ProcessorConfig::from_source(active_source()).map(Self::new)
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn last_key_press(&self) -> Instant {
        self.last_key_press
    }

    pub fn slot(&self, layer: LayerId) -> Option<SlotSnapshot> {
        self.slots
            .get(usize::from(layer))
            .map(|machine| machine.inner().snapshot)
    }

    pub fn active_layers(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, machine)| machine.inner().snapshot.active)
            .map(|(index, _)| index as LayerId)
    }

    pub fn handle_motion(
        &mut self,
        now: Instant,
        binding: &BindingParams,
        sample: MotionSample,
    ) -> ProcessorOutput {
        let mut context = DispatchContext::default();
        let Some(index) = binding.slot_index() else {
            log::trace!(
                "threshold_layer: drop motion layer={} reason=invalid_layer",
                binding.layer
            );
            context.outcome = ProcessorOutcome::InvalidLayer;
            return context.finish();
        };

        let slot = &mut self.slots[index];
        if !slot.inner().snapshot.active
            && self.config.idle_gate_blocks(now, self.last_key_press)
        {
            log::trace!(
                "threshold_layer: drop motion layer={} reason=idle_gate",
                binding.layer
            );
            context.outcome = ProcessorOutcome::IdleGated;
            return context.finish();
        }

        if !sample.axis.is_planar() {
            return context.finish();
        }

        slot.handle_with_context(
            &SlotEvent::Motion {
                axis: sample.axis,
                delta: sample.delta,
                sync: sample.sync,
                pairing: self.config.axis_pairing(),
                binding: *binding,
            },
            &mut context,
        );
        context.finish()
    }

    pub fn handle_key(&mut self, now: Instant, event: KeyPositionEvent) -> ProcessorOutput {
        let mut context = DispatchContext::default();
        if self.config.is_excluded(event.position) {
            context.outcome = ProcessorOutcome::KeyExcluded;
            return context.finish();
        }
        if !event.pressed {
            context.outcome = ProcessorOutcome::KeyReleased;
            return context.finish();
        }

        self.last_key_press = now;
        for slot in &mut self.slots {
            slot.handle_with_context(&SlotEvent::KeyReset, &mut context);
        }
        context.outcome = ProcessorOutcome::KeyReset;
        context.finish()
    }

    /// Delivers a fired auto-deactivation timer. Tokens that no longer match
    /// the slot's pending timer are ignored.
    pub fn on_timeout(&mut self, token: TimerToken) -> ProcessorOutput {
        let mut context = DispatchContext::default();
        match self.slots.get_mut(usize::from(token.layer)) {
            Some(slot) => slot.handle_with_context(&SlotEvent::Timeout { token }, &mut context),
            None => context.outcome = ProcessorOutcome::StaleTimeout,
        }
        context.finish()
    }
}
