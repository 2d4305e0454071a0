use serde::Serialize;
use std::fmt;

/// Amount of each resource dimension a worker offers or an implementation needs.
///
/// Values may drop to zero but are never negative in a consistent timeline. A description with no
/// dimension left is *useless*: it cannot host anything and gaps carrying it are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ResourceDescription {
    /// Cores (or generic slots) of a worker.
    pub computing_units: i64,

    /// Main memory in megabytes. Zero means "not constrained" for requirements.
    pub memory_mb: i64,
}

impl ResourceDescription {
    pub const fn new(computing_units: i64, memory_mb: i64) -> Self {
        ResourceDescription { computing_units, memory_mb }
    }

    pub const fn units(computing_units: i64) -> Self {
        ResourceDescription { computing_units, memory_mb: 0 }
    }

    pub fn can_host(&self, requirement: &ResourceDescription) -> bool {
        self.computing_units >= requirement.computing_units && self.memory_mb >= requirement.memory_mb
    }

    pub fn is_useless(&self) -> bool {
        self.computing_units <= 0 && self.memory_mb <= 0
    }

    pub fn increase(&mut self, other: &ResourceDescription) {
        self.computing_units += other.computing_units;
        self.memory_mb += other.memory_mb;
    }

    pub fn reduce(&mut self, other: &ResourceDescription) {
        self.computing_units -= other.computing_units;
        self.memory_mb -= other.memory_mb;
    }

    /// Takes from `self` as much of `pending` as `self` can offer on every dimension, removing it from both.
    ///
    /// # Returns
    /// The amount actually taken, which is what a consumed gap contributes to a reservation.
    pub fn reduce_common(&mut self, pending: &mut ResourceDescription) -> ResourceDescription {
        let taken = ResourceDescription {
            computing_units: self.computing_units.min(pending.computing_units).max(0),
            memory_mb: self.memory_mb.min(pending.memory_mb).max(0),
        };
        self.reduce(&taken);
        pending.reduce(&taken);
        taken
    }
}

impl fmt::Display for ResourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[cu={}, mem={}MB]", self.computing_units, self.memory_mb)
    }
}
