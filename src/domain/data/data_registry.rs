use bytes::Bytes;
use serde::Serialize;
use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;

use crate::domain::data::access::{AccessMode, AccessParams, DataAccessId, DataInstanceId, DataReference};
use crate::domain::data::data_info::DataInfo;
use crate::domain::utils::id::{DataId, DataTag, IdGenerator};
use crate::error::{Error, Result};

new_key_type! {
    pub struct DataKey;
}

/// Outcome of deleting a logical datum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub data_id: DataId,
    pub reference: DataReference,

    /// Some version is still used by a pending access; storage is released when that finishes.
    pub deferred: bool,

    /// Renamings whose backing storage can be discarded now.
    pub removed_renamings: Vec<String>,
}

/// Maps logical data names to their versions and resolves accesses into concrete versions.
///
/// Only the access processor mutates the registry, so none of its state is locked.
#[derive(Debug, Default)]
pub struct DataRegistry {
    /// Data storage.
    infos: SlotMap<DataKey, DataInfo>,

    /// Lookup of live files by location. Deleted names leave this index immediately.
    file_index: HashMap<String, DataKey>,

    /// Lookup of live objects by hash code.
    object_index: HashMap<u64, DataKey>,

    /// Lookup by data id, including deleted data whose versions are still in use.
    id_index: HashMap<DataId, DataKey>,

    data_ids: IdGenerator<DataTag>,

    /// In-memory values per renaming.
    values: HashMap<String, Bytes>,

    /// Renamings no longer needed, waiting for the storage collaborator to discard them.
    obsolete: Vec<String>,
}

impl DataRegistry {
    pub fn new() -> Self {
        DataRegistry::default()
    }

    /// Resolves an access against the current version of its datum.
    ///
    /// Reads bind to the current version. Writes reserve the next version, which immediately
    /// becomes current for later requests but only becomes available when its writer finishes.
    ///
    /// # Errors
    /// `Error::Resolution` when reading a datum that was never written.
    pub fn register_access(&mut self, params: &AccessParams) -> Result<DataAccessId> {
        let key = match self.lookup(&params.data) {
            Some(key) => key,
            None if params.mode == AccessMode::W => self.create(params.data.clone()),
            None => return Err(Error::Resolution(params.data.to_string())),
        };

        let info = self.infos.get_mut(key).ok_or_else(|| Error::Resolution(params.data.to_string()))?;

        let access = match params.mode {
            AccessMode::R => {
                let read = info.will_be_read().ok_or_else(|| Error::Resolution(params.data.to_string()))?;
                DataAccessId::Read { read }
            }
            AccessMode::W => {
                let (written, removed) = info.will_be_written();
                self.discard(removed);
                DataAccessId::Write { written }
            }
            AccessMode::RW => {
                let read = info.will_be_read().ok_or_else(|| Error::Resolution(params.data.to_string()))?;
                let (written, removed) = info.will_be_written();
                self.discard(removed);
                DataAccessId::ReadWrite { read, written, preserve_source_data: params.preserve_source_data }
            }
        };

        log::debug!("Access {:?} on {} resolved to {:?}", params.mode, params.data, access);
        Ok(access)
    }

    /// Resolves an access made by the main program. Its writes are produced on the spot.
    pub fn register_main_access(&mut self, params: &AccessParams) -> Result<DataAccessId> {
        let access = self.register_access(params)?;
        if let Some(written) = access.written_instance() {
            self.version_written(written, true);
        }
        Ok(access)
    }

    /// Ends a main-program access begun with [`DataRegistry::register_main_access`].
    pub fn finish_access(&mut self, mode: AccessMode, data: &DataReference) -> Result<()> {
        let key = self.lookup(data).ok_or_else(|| Error::Resolution(data.to_string()))?;
        let info = self.infos.get_mut(key).ok_or_else(|| Error::Resolution(data.to_string()))?;
        let current = info.current_instance().ok_or_else(|| Error::Resolution(data.to_string()))?;

        let read_version = match mode {
            AccessMode::R => current.version_id,
            // The read half of a read-write bound to the version right before the one written.
            AccessMode::RW => current.version_id.saturating_sub(1),
            AccessMode::W => return Ok(()),
        };

        let removed = info.version_has_been_read(read_version);
        self.discard(removed);
        Ok(())
    }

    pub fn finish_file_access(&mut self, mode: AccessMode, location: &str) -> Result<()> {
        self.finish_access(mode, &DataReference::File(location.to_string()))
    }

    /// Bookkeeping once the task holding `access` ended. `produced` is false when it failed,
    /// in which case the written version never becomes available.
    pub fn data_has_been_accessed(&mut self, access: &DataAccessId, produced: bool) {
        if let Some(read) = access.read_instance() {
            self.version_read(read);
        }
        if let Some(written) = access.written_instance() {
            self.version_written(written, produced);
        }
    }

    pub fn already_accessed(&self, location: &str) -> bool {
        self.file_index.contains_key(location)
    }

    pub fn is_here(&self, renaming: &str) -> bool {
        self.values.contains_key(renaming)
    }

    /// Whether the given version has been produced.
    pub fn is_available(&self, instance: DataInstanceId) -> bool {
        self.info_by_id(instance.data_id).and_then(|info| info.version(instance.version_id)).is_some_and(|v| v.available)
    }

    pub fn get_last_renaming(&self, data: &DataReference) -> Result<String> {
        self.current_instance(data).map(|i| i.renaming()).ok_or_else(|| Error::Resolution(data.to_string()))
    }

    pub fn current_instance(&self, data: &DataReference) -> Option<DataInstanceId> {
        let key = self.lookup(data)?;
        self.infos.get(key)?.current_instance()
    }

    pub fn data_id(&self, data: &DataReference) -> Option<DataId> {
        let key = self.lookup(data)?;
        self.infos.get(key).map(|i| i.data_id)
    }

    pub fn set_object_version_value(&mut self, renaming: &str, value: Bytes) {
        self.values.insert(renaming.to_string(), value);
    }

    pub fn get_object_version_value(&self, renaming: &str) -> Option<Bytes> {
        self.values.get(renaming).cloned()
    }

    /// The written version holds the same value as the read one; share it instead of copying.
    pub fn new_version_same_value(&mut self, read_renaming: &str, write_renaming: &str) {
        match self.values.get(read_renaming).cloned() {
            Some(value) => {
                self.values.insert(write_renaming.to_string(), value);
            }
            None => log::debug!("No in-memory value for {}, nothing to share with {}", read_renaming, write_renaming),
        }
    }

    /// Deletes a logical datum.
    ///
    /// The name is dropped from lookup right away, so no new access can depend on it. Storage is
    /// released now if no pending access uses any version, otherwise when the last one finishes.
    ///
    /// # Returns
    /// `None` if the name is unknown.
    pub fn delete_data(&mut self, data: &DataReference) -> Option<FileInfo> {
        let key = self.lookup(data)?;
        self.unindex(data);

        let info = self.infos.get_mut(key)?;
        let removed = info.mark_deleted();
        let deferred = !info.is_disposable();
        let data_id = info.data_id;

        if deferred {
            log::warn!("Deletion of {} deferred: versions still in use", data);
        } else {
            log::debug!("Deleted {} ({} versions)", data, removed.len());
        }

        self.discard(removed.clone());
        self.drop_if_disposable(key);

        Some(FileInfo { data_id, reference: data.clone(), deferred, removed_renamings: removed })
    }

    /// Pins a datum so none of its versions is removed.
    pub fn block_deletions(&mut self, data_id: DataId) {
        if let Some(info) = self.info_by_id_mut(data_id) {
            info.block_deletions();
        }
    }

    pub fn unblock_deletions(&mut self, data_id: DataId) {
        let Some(&key) = self.id_index.get(&data_id) else {
            return;
        };
        if let Some(info) = self.infos.get_mut(key) {
            let removed = info.unblock_deletions();
            self.discard(removed);
        }
        self.drop_if_disposable(key);
    }

    /// Renamings that became obsolete since the last call.
    pub fn take_obsolete_renamings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.obsolete)
    }

    pub fn info_by_id(&self, data_id: DataId) -> Option<&DataInfo> {
        self.id_index.get(&data_id).and_then(|key| self.infos.get(*key))
    }

    pub fn live_data_count(&self) -> usize {
        self.file_index.len() + self.object_index.len()
    }

    fn info_by_id_mut(&mut self, data_id: DataId) -> Option<&mut DataInfo> {
        let key = *self.id_index.get(&data_id)?;
        self.infos.get_mut(key)
    }

    fn version_read(&mut self, instance: DataInstanceId) {
        let Some(&key) = self.id_index.get(&instance.data_id) else {
            log::warn!("Read finished on unknown data {}", instance);
            return;
        };
        if let Some(info) = self.infos.get_mut(key) {
            let removed = info.version_has_been_read(instance.version_id);
            self.discard(removed);
        }
        self.drop_if_disposable(key);
    }

    fn version_written(&mut self, instance: DataInstanceId, produced: bool) {
        let Some(&key) = self.id_index.get(&instance.data_id) else {
            log::warn!("Write finished on unknown data {}", instance);
            return;
        };
        if let Some(info) = self.infos.get_mut(key) {
            let removed = info.version_has_been_written(instance.version_id, produced);
            self.discard(removed);
        }
        self.drop_if_disposable(key);
    }

    fn lookup(&self, data: &DataReference) -> Option<DataKey> {
        match data {
            DataReference::File(location) => self.file_index.get(location).copied(),
            DataReference::Object(code) => self.object_index.get(code).copied(),
        }
    }

    fn create(&mut self, data: DataReference) -> DataKey {
        let data_id = self.data_ids.next_id();
        let key = self.infos.insert(DataInfo::new(data_id, data.clone()));

        match &data {
            DataReference::File(location) => self.file_index.insert(location.clone(), key),
            DataReference::Object(code) => self.object_index.insert(*code, key),
        };
        self.id_index.insert(data_id, key);

        log::debug!("New data {} registered as {}", data, data_id);
        key
    }

    fn unindex(&mut self, data: &DataReference) {
        match data {
            DataReference::File(location) => self.file_index.remove(location),
            DataReference::Object(code) => self.object_index.remove(code),
        };
    }

    fn drop_if_disposable(&mut self, key: DataKey) {
        if self.infos.get(key).is_some_and(|i| i.is_disposable()) {
            if let Some(info) = self.infos.remove(key) {
                self.id_index.remove(&info.data_id);
            }
        }
    }

    fn discard(&mut self, renamings: Vec<String>) {
        for renaming in renamings {
            self.values.remove(&renaming);
            self.obsolete.push(renaming);
        }
    }
}
