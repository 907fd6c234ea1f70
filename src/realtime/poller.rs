//! Per-session novelty detection
//!
//! The poller only decides *what* to deliver. Timing and sending live in
//! [`super::session`], which drives it once per tick.

use crate::types::{StepId, StepRecord};

/// Lifecycle of a session's poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Created, no tick taken yet
    Init,
    /// Ticking
    Polling,
    /// Stopped for good
    Terminated,
}

/// Tracks the last step handed to one viewer.
///
/// `last_delivered_step` starts at 0 ("nothing delivered") and never moves
/// backwards, so delivered step ids are strictly increasing.
#[derive(Debug, Clone)]
pub struct SnapshotPoller {
    state: PollerState,
    last_delivered_step: StepId,
}

impl Default for SnapshotPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotPoller {
    pub fn new() -> Self {
        Self {
            state: PollerState::Init,
            last_delivered_step: 0,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn last_delivered_step(&self) -> StepId {
        self.last_delivered_step
    }

    pub fn is_terminated(&self) -> bool {
        self.state == PollerState::Terminated
    }

    /// `Init -> Polling`. No effect once terminated.
    pub fn start(&mut self) {
        if self.state == PollerState::Init {
            self.state = PollerState::Polling;
        }
    }

    /// Any state -> `Terminated`
    pub fn terminate(&mut self) {
        self.state = PollerState::Terminated;
    }

    /// Pick the novel snapshot out of a window of recent steps, if any.
    ///
    /// Only the last (freshest) element is considered; older steps that were
    /// never delivered are skipped on purpose.
    pub fn observe<'a>(&self, window: &'a [StepRecord]) -> Option<&'a StepRecord> {
        if self.state != PollerState::Polling {
            return None;
        }
        window
            .last()
            .filter(|latest| latest.step > self.last_delivered_step)
    }

    /// Move the cursor to `step`. Older ids are ignored.
    pub fn advance(&mut self, step: StepId) {
        if step > self.last_delivered_step {
            self.last_delivered_step = step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(ids: &[StepId]) -> Vec<StepRecord> {
        ids.iter().map(|&id| StepRecord::new(id, 0, 0.0)).collect()
    }

    #[test]
    fn test_state_transitions() {
        let mut poller = SnapshotPoller::new();
        assert_eq!(poller.state(), PollerState::Init);

        poller.start();
        assert_eq!(poller.state(), PollerState::Polling);

        poller.terminate();
        poller.start();
        assert!(poller.is_terminated());
    }

    #[test]
    fn test_observe_requires_polling() {
        let poller = SnapshotPoller::new();
        assert!(poller.observe(&window(&[1, 2])).is_none());
    }

    #[test]
    fn test_observe_picks_latest_novel_step() {
        let mut poller = SnapshotPoller::new();
        poller.start();

        let steps = window(&[1, 2, 3]);
        assert_eq!(poller.observe(&steps).map(|s| s.step), Some(3));

        poller.advance(3);
        assert!(poller.observe(&steps).is_none());
        assert!(poller.observe(&[]).is_none());

        let steps = window(&[3, 4, 5, 6]);
        assert_eq!(poller.observe(&steps).map(|s| s.step), Some(6));
    }

    #[test]
    fn test_non_positive_steps_are_never_novel() {
        let mut poller = SnapshotPoller::new();
        poller.start();
        assert!(poller.observe(&window(&[-1, 0])).is_none());
    }

    #[test]
    fn test_advance_never_moves_back() {
        let mut poller = SnapshotPoller::new();
        poller.advance(10);
        poller.advance(4);
        assert_eq!(poller.last_delivered_step(), 10);
    }
}
