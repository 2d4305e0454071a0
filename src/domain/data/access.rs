use serde::Serialize;
use std::fmt;

use crate::domain::utils::id::DataId;

/// How a parameter interacts with its datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessMode {
    /// Read only: binds to the current version.
    R,
    /// Write only: produces a fresh version.
    W,
    /// Reads the current version and produces a fresh one.
    RW,
}

impl AccessMode {
    pub fn is_read(self) -> bool {
        matches!(self, AccessMode::R | AccessMode::RW)
    }

    pub fn is_write(self) -> bool {
        matches!(self, AccessMode::W | AccessMode::RW)
    }
}

/// Application-visible handle of a logical datum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DataReference {
    /// On-disk datum keyed by its location.
    File(String),
    /// In-memory object keyed by its hash code.
    Object(u64),
}

impl fmt::Display for DataReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataReference::File(location) => write!(f, "file:{}", location),
            DataReference::Object(code) => write!(f, "object:{}", code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessParams {
    pub mode: AccessMode,
    pub data: DataReference,
    /// Only meaningful for `RW`: whether the read version must survive the write.
    pub preserve_source_data: bool,
}

impl AccessParams {
    pub fn new(mode: AccessMode, data: DataReference) -> Self {
        AccessParams { mode, data, preserve_source_data: true }
    }

    pub fn file(mode: AccessMode, location: impl Into<String>) -> Self {
        AccessParams::new(mode, DataReference::File(location.into()))
    }

    pub fn object(mode: AccessMode, code: u64) -> Self {
        AccessParams::new(mode, DataReference::Object(code))
    }
}

/// One immutable version of a datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DataInstanceId {
    pub data_id: DataId,
    pub version_id: u32,
}

impl DataInstanceId {
    pub fn new(data_id: DataId, version_id: u32) -> Self {
        DataInstanceId { data_id, version_id }
    }

    pub fn renaming(&self) -> String {
        format!("d{}v{}", self.data_id.id, self.version_id)
    }
}

impl fmt::Display for DataInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.renaming())
    }
}

/// Resolved access: which version is read and which one is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataAccessId {
    Read { read: DataInstanceId },
    Write { written: DataInstanceId },
    ReadWrite { read: DataInstanceId, written: DataInstanceId, preserve_source_data: bool },
}

impl DataAccessId {
    pub fn data_id(&self) -> DataId {
        match self {
            DataAccessId::Read { read } => read.data_id,
            DataAccessId::Write { written } => written.data_id,
            DataAccessId::ReadWrite { read, .. } => read.data_id,
        }
    }

    pub fn mode(&self) -> AccessMode {
        match self {
            DataAccessId::Read { .. } => AccessMode::R,
            DataAccessId::Write { .. } => AccessMode::W,
            DataAccessId::ReadWrite { .. } => AccessMode::RW,
        }
    }

    pub fn read_instance(&self) -> Option<DataInstanceId> {
        match self {
            DataAccessId::Read { read } | DataAccessId::ReadWrite { read, .. } => Some(*read),
            DataAccessId::Write { .. } => None,
        }
    }

    pub fn written_instance(&self) -> Option<DataInstanceId> {
        match self {
            DataAccessId::Write { written } | DataAccessId::ReadWrite { written, .. } => Some(*written),
            DataAccessId::Read { .. } => None,
        }
    }
}
