use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Numeric identifier tagged with the kind of entity it names, so a `TaskId` can never be passed where a `DataId` is expected.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize)]
#[serde(transparent)]
pub struct Id<T> {
    pub id: u64,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub const fn new(id: u64) -> Self {
        Id { id, _marker: PhantomData }
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> From<Id<T>> for u64 {
    fn from(id_wrapper: Id<T>) -> Self {
        id_wrapper.id
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        let display_name = clean_name.replace("Tag", "Id");

        write!(f, "{}: {}", display_name, self.id)
    }
}

/// Hands out ids in creation order, starting at 1.
#[derive(Debug, Clone)]
pub struct IdGenerator<T> {
    next: u64,
    _marker: PhantomData<T>,
}

impl<T> IdGenerator<T> {
    pub fn new() -> Self {
        IdGenerator { next: 1, _marker: PhantomData }
    }

    pub fn next_id(&mut self) -> Id<T> {
        let id = Id::new(self.next);
        self.next += 1;
        id
    }
}

impl<T> Default for IdGenerator<T> {
    fn default() -> Self {
        IdGenerator::new()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy, Serialize)]
pub struct TaskTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy, Serialize)]
pub struct AppTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy, Serialize)]
pub struct DataTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy, Serialize)]
pub struct CoreTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy, Serialize)]
pub struct WorkerTag;

pub type TaskId = Id<TaskTag>;
pub type AppId = Id<AppTag>;
pub type DataId = Id<DataTag>;
pub type CoreId = Id<CoreTag>;
pub type WorkerId = Id<WorkerTag>;
