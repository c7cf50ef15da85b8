use super::{config::AxisPairing, types::RelativeAxis};

/// `max(|dx|, |dy|) + min(|dx|, |dy|) / 2`, an integer stand-in for the
/// Euclidean length. Overestimates by at most ~11.8%.
pub fn approximate_distance(dx: i32, dy: i32) -> u32 {
    let abs_dx = dx.unsigned_abs();
    let abs_dy = dy.unsigned_abs();
    let (max, min) = if abs_dx > abs_dy {
        (abs_dx, abs_dy)
    } else {
        (abs_dy, abs_dx)
    };
    max.saturating_add(min >> 1)
}

/// Axis deltas buffered until they can be combined into one distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingDeltas {
    dx: i32,
    dy: i32,
    has_x: bool,
    has_y: bool,
}

impl PendingDeltas {
    pub const fn new() -> Self {
        Self {
            dx: 0,
            dy: 0,
            has_x: false,
            has_y: false,
        }
    }

    /// Buffers one planar delta and returns the combined distance once the
    /// pairing mode says the buffer is complete. The buffer is cleared after
    /// every combination.
    pub fn record(
        &mut self,
        axis: RelativeAxis,
        delta: i32,
        sync: bool,
        pairing: AxisPairing,
    ) -> Option<u32> {
        match pairing {
            AxisPairing::PerSample => {
                self.store(axis, delta);
                Some(self.take())
            }
            AxisPairing::SyncReport => {
                // A repeated axis before sync means the report boundary was
                // lost; flush what is buffered into the next combination.
                let repeated = match axis {
                    RelativeAxis::X => self.has_x,
                    RelativeAxis::Y => self.has_y,
                    _ => false,
                };
                if repeated {
                    let carried = self.take();
                    self.store(axis, delta);
                    if sync {
                        return Some(carried.saturating_add(self.take()));
                    }
                    return Some(carried);
                }

                self.store(axis, delta);
                if sync || (self.has_x && self.has_y) {
                    Some(self.take())
                } else {
                    None
                }
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        !self.has_x && !self.has_y
    }

    fn store(&mut self, axis: RelativeAxis, delta: i32) {
        match axis {
            RelativeAxis::X => {
                self.dx = delta;
                self.has_x = true;
            }
            RelativeAxis::Y => {
                self.dy = delta;
                self.has_y = true;
            }
            RelativeAxis::Wheel | RelativeAxis::HorizontalWheel => {}
        }
    }

    fn take(&mut self) -> u32 {
        let distance = approximate_distance(self.dx, self.dy);
        self.clear();
        distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximation_matches_reference_points() {
        assert_eq!(approximate_distance(3, 4), 5);
        assert_eq!(approximate_distance(8, 0), 8);
        assert_eq!(approximate_distance(-6, 2), 7);
        assert_eq!(approximate_distance(0, 0), 0);
        assert_eq!(approximate_distance(0, -9), 9);
    }

    #[test]
    fn approximation_is_symmetric_and_sign_blind() {
        for (dx, dy) in [(5, 12), (-7, 3), (1, -1), (100, -250)] {
            let reference = approximate_distance(dx, dy);
            assert_eq!(approximate_distance(dy, dx), reference);
            assert_eq!(approximate_distance(-dx, -dy), reference);
        }
    }

    #[test]
    fn approximation_handles_i32_min_without_overflow() {
        assert_eq!(approximate_distance(i32::MIN, 0), 1 << 31);
        assert_eq!(approximate_distance(i32::MIN, i32::MIN), 3 << 30);
    }

    #[test]
    fn per_sample_pairing_scores_each_axis_alone() {
        let mut pending = PendingDeltas::new();
        assert_eq!(
            pending.record(RelativeAxis::X, 3, false, AxisPairing::PerSample),
            Some(3)
        );
        assert!(pending.is_empty());
        assert_eq!(
            pending.record(RelativeAxis::Y, -4, true, AxisPairing::PerSample),
            Some(4)
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn sync_report_pairing_combines_one_report() {
        let mut pending = PendingDeltas::new();
        assert_eq!(
            pending.record(RelativeAxis::X, 3, false, AxisPairing::SyncReport),
            None
        );
        assert_eq!(
            pending.record(RelativeAxis::Y, 4, true, AxisPairing::SyncReport),
            Some(5)
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn sync_report_pairing_closes_single_axis_report_on_sync() {
        let mut pending = PendingDeltas::new();
        assert_eq!(
            pending.record(RelativeAxis::Y, -9, true, AxisPairing::SyncReport),
            Some(9)
        );
    }

    #[test]
    fn sync_report_pairing_flushes_on_repeated_axis() {
        let mut pending = PendingDeltas::new();
        assert_eq!(
            pending.record(RelativeAxis::X, 6, false, AxisPairing::SyncReport),
            None
        );
        assert_eq!(
            pending.record(RelativeAxis::X, 2, false, AxisPairing::SyncReport),
            Some(6)
        );
        assert!(!pending.is_empty());
        assert_eq!(
            pending.record(RelativeAxis::Y, 2, true, AxisPairing::SyncReport),
            Some(3)
        );
    }
}
