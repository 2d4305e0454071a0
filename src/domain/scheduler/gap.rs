use serde::Serialize;

use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::scheduler::action::ActionKey;

/// End of a gap that stays open forever.
pub const UNBOUNDED: i64 = i64::MAX;

/// Free capacity of one worker during `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub start: i64,
    pub end: i64,

    /// Action whose end freed this capacity. `None` means the capacity was never used, or the
    /// action it came from no longer constrains anything.
    #[serde(skip)]
    pub origin: Option<ActionKey>,

    pub resources: ResourceDescription,

    /// Actions an optimization pass already packed into the gap this one is left over from.
    pub capacity: u32,
}

impl Gap {
    pub fn new(start: i64, end: i64, origin: Option<ActionKey>, resources: ResourceDescription) -> Self {
        Gap { start, end, origin, resources, capacity: 0 }
    }

    pub fn with_packed(mut self, packed: u32) -> Self {
        self.capacity = packed;
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.end == UNBOUNDED
    }

    pub fn covers(&self, instant: i64) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn width(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_useless() || self.end <= self.start
    }
}
