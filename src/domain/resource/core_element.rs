use serde::Serialize;
use std::collections::HashMap;

use crate::api::runtime_config_dto::CoreElementDto;
use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::utils::id::CoreId;
use crate::error::{Error, Result};

/// Key of an implementation inside the core registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImplementationKey {
    pub core_id: CoreId,
    pub impl_id: u32,
}

/// One concrete variant of a core element together with what it needs to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Implementation {
    pub key: ImplementationKey,
    pub requirements: ResourceDescription,
    pub expected_duration_ms: Option<i64>,
}

/// A callable identity with every implementation able to serve it.
#[derive(Debug, Clone, Serialize)]
pub struct CoreElement {
    pub id: CoreId,
    pub signature: String,
    pub implementations: Vec<Implementation>,
}

/// Closed set of core elements known to the runtime, resolved once at configuration time.
#[derive(Debug, Clone, Default)]
pub struct CoreRegistry {
    cores: Vec<CoreElement>,
    by_signature: HashMap<String, CoreId>,
}

impl CoreRegistry {
    pub fn new() -> Self {
        CoreRegistry::default()
    }

    pub fn from_dto(dtos: &[CoreElementDto]) -> Result<Self> {
        let mut registry = CoreRegistry::new();

        for dto in dtos {
            if dto.implementations.is_empty() {
                return Err(Error::Configuration(format!("Core element '{}' declares no implementation", dto.signature)));
            }

            let implementations = dto
                .implementations
                .iter()
                .map(|i| (ResourceDescription::new(i.computing_units, i.memory_mb), i.expected_duration_ms))
                .collect();

            registry.register(&dto.signature, implementations)?;
        }

        Ok(registry)
    }

    /// Registers a core element with `(requirements, expected duration)` per implementation.
    pub fn register(&mut self, signature: &str, implementations: Vec<(ResourceDescription, Option<i64>)>) -> Result<CoreId> {
        if self.by_signature.contains_key(signature) {
            return Err(Error::Configuration(format!("Core element '{}' registered twice", signature)));
        }

        let core_id = CoreId::new(self.cores.len() as u64);
        let implementations = implementations
            .into_iter()
            .enumerate()
            .map(|(i, (requirements, expected_duration_ms))| Implementation {
                key: ImplementationKey { core_id, impl_id: i as u32 },
                requirements,
                expected_duration_ms,
            })
            .collect();

        self.cores.push(CoreElement { id: core_id, signature: signature.to_string(), implementations });
        self.by_signature.insert(signature.to_string(), core_id);

        log::debug!("Registered core element '{}' as {:?}", signature, core_id);
        Ok(core_id)
    }

    pub fn get(&self, core_id: CoreId) -> Option<&CoreElement> {
        self.cores.get(core_id.id as usize)
    }

    pub fn core_id(&self, signature: &str) -> Option<CoreId> {
        self.by_signature.get(signature).copied()
    }

    pub fn implementations(&self, core_id: CoreId) -> &[Implementation] {
        self.get(core_id).map(|c| c.implementations.as_slice()).unwrap_or(&[])
    }

    pub fn implementation(&self, key: ImplementationKey) -> Option<&Implementation> {
        self.get(key.core_id)?.implementations.get(key.impl_id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoreElement> {
        self.cores.iter()
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }
}
