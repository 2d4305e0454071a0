use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::data::access::{DataInstanceId, DataReference};
use crate::domain::utils::id::DataId;

/// Bookkeeping of one version of a datum.
#[derive(Debug, Clone, Serialize)]
pub struct DataVersion {
    pub instance: DataInstanceId,

    /// Accesses that bound to this version for reading and have not finished yet.
    pub readers: u32,

    /// Pending producers of this version (one, until it has been written).
    pub writers: u32,

    /// The version has been produced and can be read by a transfer.
    pub available: bool,

    /// No future access can bind to this version; it goes away once nothing uses it.
    pub to_delete: bool,
}

impl DataVersion {
    fn new(instance: DataInstanceId) -> Self {
        DataVersion { instance, readers: 0, writers: 0, available: false, to_delete: false }
    }

    fn is_unused(&self) -> bool {
        self.readers == 0 && self.writers == 0
    }
}

/// Version history of one logical datum.
#[derive(Debug, Clone, Serialize)]
pub struct DataInfo {
    pub data_id: DataId,
    pub reference: DataReference,

    /// Live versions by version id. Removed versions are gone for good.
    versions: BTreeMap<u32, DataVersion>,

    /// Version every new access binds to; `0` before the first write.
    current_version_id: u32,

    /// While positive, removals are postponed (results are being fetched).
    deletion_blocks: u32,

    /// The name was deleted by the application and will vanish once unused.
    deleted: bool,
}

impl DataInfo {
    pub fn new(data_id: DataId, reference: DataReference) -> Self {
        DataInfo { data_id, reference, versions: BTreeMap::new(), current_version_id: 0, deletion_blocks: 0, deleted: false }
    }

    pub fn current_instance(&self) -> Option<DataInstanceId> {
        self.versions.get(&self.current_version_id).map(|v| v.instance)
    }

    pub fn current_version(&self) -> Option<&DataVersion> {
        self.versions.get(&self.current_version_id)
    }

    pub fn version(&self, version_id: u32) -> Option<&DataVersion> {
        self.versions.get(&version_id)
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Binds a read to the current version.
    pub fn will_be_read(&mut self) -> Option<DataInstanceId> {
        let version = self.versions.get_mut(&self.current_version_id)?;
        version.readers += 1;
        Some(version.instance)
    }

    /// Creates the next version and makes it current. The superseded version becomes obsolete.
    ///
    /// # Returns
    /// The new instance and the renamings that could be discarded right away.
    pub fn will_be_written(&mut self) -> (DataInstanceId, Vec<String>) {
        let previous = self.current_version_id;
        if let Some(version) = self.versions.get_mut(&previous) {
            version.to_delete = true;
        }

        self.current_version_id += 1;
        let instance = DataInstanceId::new(self.data_id, self.current_version_id);
        let mut version = DataVersion::new(instance);
        version.writers = 1;
        self.versions.insert(self.current_version_id, version);

        let removed = self.try_remove(previous).into_iter().collect();
        (instance, removed)
    }

    pub fn version_has_been_read(&mut self, version_id: u32) -> Vec<String> {
        match self.versions.get_mut(&version_id) {
            Some(version) if version.readers > 0 => version.readers -= 1,
            Some(version) => log::error!("Version {} has no pending reader to release", version.instance),
            None => log::warn!("Read of removed version {} of data {}", version_id, self.data_id),
        }
        self.try_remove(version_id).into_iter().collect()
    }

    /// Marks a version as produced (`produced == false` when its writer failed).
    pub fn version_has_been_written(&mut self, version_id: u32, produced: bool) -> Vec<String> {
        match self.versions.get_mut(&version_id) {
            Some(version) => {
                version.writers = version.writers.saturating_sub(1);
                version.available |= produced;
            }
            None => log::warn!("Write of removed version {} of data {}", version_id, self.data_id),
        }
        self.try_remove(version_id).into_iter().collect()
    }

    /// Marks every version obsolete.
    ///
    /// # Returns
    /// The renamings removed immediately. Versions with pending accesses stay until they finish.
    pub fn mark_deleted(&mut self) -> Vec<String> {
        self.deleted = true;
        for version in self.versions.values_mut() {
            version.to_delete = true;
        }
        self.sweep()
    }

    pub fn has_pending_accesses(&self) -> bool {
        self.versions.values().any(|v| !v.is_unused())
    }

    /// Nothing is left to keep: deleted and every version gone.
    pub fn is_disposable(&self) -> bool {
        self.deleted && self.versions.is_empty()
    }

    pub fn block_deletions(&mut self) {
        self.deletion_blocks += 1;
    }

    pub fn unblock_deletions(&mut self) -> Vec<String> {
        self.deletion_blocks = self.deletion_blocks.saturating_sub(1);
        self.sweep()
    }

    fn sweep(&mut self) -> Vec<String> {
        let ids: Vec<u32> = self.versions.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.try_remove(id)).collect()
    }

    fn try_remove(&mut self, version_id: u32) -> Option<String> {
        if self.deletion_blocks > 0 {
            return None;
        }

        let removable = self.versions.get(&version_id).is_some_and(|v| v.to_delete && v.is_unused());
        if !removable {
            return None;
        }

        self.versions.remove(&version_id).map(|v| v.instance.renaming())
    }
}
