use embassy_time::Duration;
use heapless::Vec;

pub type LayerId = u8;
pub type PositionId = u32;

/// Layers addressable by a binding; one slot is reserved per layer.
pub const MAX_LAYER_SLOTS: usize = 16;
/// The excluded-position count is carried in a `u8`.
pub const MAX_EXCLUDED_POSITIONS: usize = u8::MAX as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelativeAxis {
    X,
    Y,
    Wheel,
    HorizontalWheel,
}

impl RelativeAxis {
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::X | Self::Y)
    }
}

/// One relative-motion input event. `sync` marks the last event of a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionSample {
    pub axis: RelativeAxis,
    pub delta: i32,
    pub sync: bool,
}

impl MotionSample {
    pub const fn x(delta: i32) -> Self {
        Self {
            axis: RelativeAxis::X,
            delta,
            sync: false,
        }
    }

    pub const fn y(delta: i32) -> Self {
        Self {
            axis: RelativeAxis::Y,
            delta,
            sync: false,
        }
    }

    pub const fn synced(self) -> Self {
        Self { sync: true, ..self }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyPositionEvent {
    pub position: PositionId,
    pub pressed: bool,
}

impl KeyPositionEvent {
    pub const fn pressed(position: PositionId) -> Self {
        Self {
            position,
            pressed: true,
        }
    }

    pub const fn released(position: PositionId) -> Self {
        Self {
            position,
            pressed: false,
        }
    }
}

/// Handle of one armed auto-deactivation timer. A new generation is minted on
/// every arm, so a callback carrying an older token is recognisably stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerToken {
    pub layer: LayerId,
    pub generation: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerAction {
    Activate(LayerId),
    Deactivate(LayerId),
    /// Schedule `token` to fire after `after`, replacing any timer pending for
    /// the same layer.
    ArmTimeout {
        token: TimerToken,
        after: Duration,
    },
    CancelTimeout(TimerToken),
}

/// Worst case is a key press tearing down every slot: cancel plus deactivate.
pub const ACTION_BUFFER_MAX: usize = MAX_LAYER_SLOTS * 2;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionBuffer {
    actions: Vec<LayerAction, ACTION_BUFFER_MAX>,
}

impl ActionBuffer {
    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: LayerAction) {
        let _ = self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerAction> {
        self.actions.iter()
    }

    pub fn as_slice(&self) -> &[LayerAction] {
        &self.actions
    }

    pub fn contains_activate(&self, layer: LayerId) -> bool {
        self.iter()
            .any(|action| matches!(action, LayerAction::Activate(l) if *l == layer))
    }

    pub fn contains_deactivate(&self, layer: LayerId) -> bool {
        self.iter()
            .any(|action| matches!(action, LayerAction::Deactivate(l) if *l == layer))
    }

    pub fn armed_token(&self) -> Option<TimerToken> {
        self.actions.iter().rev().find_map(|action| match action {
            LayerAction::ArmTimeout { token, .. } => Some(*token),
            _ => None,
        })
    }
}

/// What a single call did. Purely diagnostic; the host pipeline ignores it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessorOutcome {
    #[default]
    Ignored,
    InvalidLayer,
    IdleGated,
    AwaitingPair,
    Accumulated,
    Activated,
    Refreshed,
    KeyExcluded,
    KeyReleased,
    KeyReset,
    TimedOut,
    StaleTimeout,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessorOutput {
    pub actions: ActionBuffer,
    pub outcome: ProcessorOutcome,
}
