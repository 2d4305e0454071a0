use std::cmp::Ordering;

use crate::domain::scheduler::action::ActionKey;

/// Kind of a simulated event. Ends sort before starts at the same instant so freed capacity is
/// visible to reservations made at that instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    End,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingEvent {
    pub time: i64,
    pub kind: EventKind,

    /// Creation id of the action, the last tie-breaker.
    pub action_id: u64,
    pub action: ActionKey,
}

impl SchedulingEvent {
    pub fn start(time: i64, action_id: u64, action: ActionKey) -> Self {
        SchedulingEvent { time, kind: EventKind::Start, action_id, action }
    }

    pub fn end(time: i64, action_id: u64, action: ActionKey) -> Self {
        SchedulingEvent { time, kind: EventKind::End, action_id, action }
    }
}

impl Ord for SchedulingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.action_id.cmp(&other.action_id))
            .then_with(|| self.action.cmp(&other.action))
    }
}

impl PartialOrd for SchedulingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
