use serde::Serialize;
use std::collections::HashMap;

use crate::api::runtime_config_dto::WorkerDto;
use crate::domain::resource::core_element::{Implementation, ImplementationKey};
use crate::domain::resource::profile::Profile;
use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::utils::id::WorkerId;
use crate::error::{Error, Result};

/// A compute resource actions are placed on.
///
/// The worker tracks its physical reservation state. Planned future usage lives in the
/// timeline of the owning resource scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,

    /// Total capacity. This value remains constant.
    pub capacity: ResourceDescription,

    /// Capacity not reserved by running actions.
    available: ResourceDescription,

    /// Historical durations per implementation executed here.
    #[serde(skip)]
    profiles: HashMap<ImplementationKey, Profile>,
}

impl Worker {
    pub fn new(id: WorkerId, name: impl Into<String>, capacity: ResourceDescription) -> Self {
        Worker { id, name: name.into(), capacity, available: capacity, profiles: HashMap::new() }
    }

    pub fn from_dto(id: WorkerId, dto: &WorkerDto) -> Result<Self> {
        if dto.computing_units <= 0 {
            return Err(Error::Configuration(format!("Worker '{}' needs at least one computing unit", dto.name)));
        }
        Ok(Worker::new(id, dto.name.clone(), ResourceDescription::new(dto.computing_units, dto.memory_mb)))
    }

    pub fn available(&self) -> ResourceDescription {
        self.available
    }

    /// Static compatibility: could this worker ever run the implementation.
    pub fn can_run(&self, implementation: &Implementation) -> bool {
        self.capacity.can_host(&implementation.requirements)
    }

    pub fn can_host_now(&self, requirement: &ResourceDescription) -> bool {
        self.available.can_host(requirement)
    }

    /// Reserves `requirement` out of the available capacity.
    ///
    /// # Returns
    /// `false` if the requirement exceeds the available capacity; nothing is reserved then.
    pub fn reserve(&mut self, requirement: &ResourceDescription) -> bool {
        if !self.available.can_host(requirement) {
            log::debug!("Worker '{}' cannot reserve {} (available {})", self.name, requirement, self.available);
            return false;
        }

        self.available.reduce(requirement);
        true
    }

    pub fn release(&mut self, requirement: &ResourceDescription) {
        self.available.increase(requirement);

        if !self.capacity.can_host(&self.available) {
            log::error!(
                "Release of {} on worker '{}' exceeds its capacity {} --> Signals an error in the reservation bookkeeping.",
                requirement,
                self.name,
                self.capacity
            );
            self.available = self.capacity;
        }
    }

    pub fn profile(&self, implementation: &Implementation) -> Profile {
        self.profiles.get(&implementation.key).cloned().unwrap_or_else(|| Profile::new(implementation.expected_duration_ms))
    }

    pub fn expected_duration(&self, implementation: &Implementation) -> i64 {
        self.profile(implementation).expected_duration()
    }

    pub fn update_profile(&mut self, implementation: &Implementation, duration_ms: i64) {
        self.profiles
            .entry(implementation.key)
            .or_insert_with(|| Profile::new(implementation.expected_duration_ms))
            .update(duration_ms);
    }
}
