use bytes::Bytes;

use crate::domain::data::access::{AccessMode, AccessParams, DataAccessId, DataReference};
use crate::domain::data::data_registry::DataRegistry;
use crate::error::Error;

// --- HELPER FUNCTIONS ---

fn write(registry: &mut DataRegistry, location: &str) -> DataAccessId {
    registry.register_access(&AccessParams::file(AccessMode::W, location)).unwrap()
}

fn read(registry: &mut DataRegistry, location: &str) -> DataAccessId {
    registry.register_access(&AccessParams::file(AccessMode::R, location)).unwrap()
}

// --- TESTS ---

#[test]
fn test_first_write_creates_name() {
    let mut registry = DataRegistry::new();
    let access = write(&mut registry, "/tmp/x");

    let written = access.written_instance().unwrap();
    assert_eq!(written.version_id, 1);
    assert_eq!(written.renaming(), format!("d{}v1", written.data_id.id));
    assert!(access.read_instance().is_none());
    assert!(registry.already_accessed("/tmp/x"));
}

#[test]
fn test_read_of_unknown_name_is_resolution_error() {
    let mut registry = DataRegistry::new();

    let result = registry.register_access(&AccessParams::file(AccessMode::R, "/missing"));
    assert!(matches!(result, Err(Error::Resolution(_))));

    let result = registry.register_access(&AccessParams::object(AccessMode::RW, 42));
    assert!(matches!(result, Err(Error::Resolution(_))));
    assert_eq!(registry.live_data_count(), 0);
}

#[test]
fn test_versions_strictly_increase_and_reads_bind_to_current() {
    let mut registry = DataRegistry::new();

    let w1 = write(&mut registry, "x").written_instance().unwrap();
    let r1 = read(&mut registry, "x").read_instance().unwrap();
    let w2 = write(&mut registry, "x").written_instance().unwrap();
    let r2 = read(&mut registry, "x").read_instance().unwrap();
    let w3 = write(&mut registry, "x").written_instance().unwrap();

    assert_eq!(r1, w1);
    assert_eq!(r2, w2);
    assert!(w1.version_id < w2.version_id && w2.version_id < w3.version_id);
    assert_eq!(registry.get_last_renaming(&DataReference::File("x".into())).unwrap(), w3.renaming());
}

#[test]
fn test_read_write_carries_both_versions() {
    let mut registry = DataRegistry::new();
    write(&mut registry, "y");

    let access = registry.register_access(&AccessParams::file(AccessMode::RW, "y")).unwrap();
    let (read, written) = (access.read_instance().unwrap(), access.written_instance().unwrap());

    assert_eq!(access.mode(), AccessMode::RW);
    assert_eq!(read.version_id + 1, written.version_id);
    assert_eq!(read.data_id, written.data_id);
}

#[test]
fn test_written_version_available_only_after_writer_finishes() {
    let mut registry = DataRegistry::new();
    let access = write(&mut registry, "z");
    let written = access.written_instance().unwrap();

    assert!(!registry.is_available(written));
    registry.data_has_been_accessed(&access, true);
    assert!(registry.is_available(written));
}

#[test]
fn test_failed_writer_never_produces_its_version() {
    let mut registry = DataRegistry::new();
    let access = write(&mut registry, "z");

    registry.data_has_been_accessed(&access, false);
    assert!(!registry.is_available(access.written_instance().unwrap()));
}

#[test]
fn test_superseded_version_is_discarded_after_last_reader() {
    let mut registry = DataRegistry::new();
    let w1 = write(&mut registry, "x");
    registry.data_has_been_accessed(&w1, true);
    let r1 = read(&mut registry, "x");
    let w2 = write(&mut registry, "x");

    // v1 still has a pending reader.
    assert!(registry.take_obsolete_renamings().is_empty());

    registry.data_has_been_accessed(&r1, true);
    assert_eq!(registry.take_obsolete_renamings(), vec![w1.written_instance().unwrap().renaming()]);

    registry.data_has_been_accessed(&w2, true);
    assert!(registry.take_obsolete_renamings().is_empty());
}

#[test]
fn test_delete_without_pending_accesses_is_immediate() {
    let mut registry = DataRegistry::new();
    let w = write(&mut registry, "f");
    registry.data_has_been_accessed(&w, true);

    let info = registry.delete_data(&DataReference::File("f".into())).unwrap();
    assert!(!info.deferred);
    assert_eq!(info.removed_renamings, vec![w.written_instance().unwrap().renaming()]);
    assert!(!registry.already_accessed("f"));
    assert!(registry.info_by_id(info.data_id).is_none());
}

#[test]
fn test_delete_with_pending_reader_is_deferred() {
    let mut registry = DataRegistry::new();
    let w = write(&mut registry, "f");
    registry.data_has_been_accessed(&w, true);
    let r = read(&mut registry, "f");

    let info = registry.delete_data(&DataReference::File("f".into())).unwrap();
    assert!(info.deferred);
    assert!(info.removed_renamings.is_empty());

    // Removed from lookup at once: a new read fails, a new write starts a fresh datum.
    assert!(registry.register_access(&AccessParams::file(AccessMode::R, "f")).is_err());
    let fresh = write(&mut registry, "f");
    assert_ne!(fresh.data_id(), info.data_id);

    registry.data_has_been_accessed(&r, true);
    assert_eq!(registry.take_obsolete_renamings(), vec![w.written_instance().unwrap().renaming()]);
    assert!(registry.info_by_id(info.data_id).is_none());
}

#[test]
fn test_delete_unknown_returns_none() {
    let mut registry = DataRegistry::new();
    assert!(registry.delete_data(&DataReference::Object(7)).is_none());
}

#[test]
fn test_blocked_deletion_waits_for_unblock() {
    let mut registry = DataRegistry::new();
    let w = write(&mut registry, "f");
    registry.data_has_been_accessed(&w, true);
    let data_id = w.data_id();

    registry.block_deletions(data_id);
    let info = registry.delete_data(&DataReference::File("f".into())).unwrap();
    assert!(info.deferred);

    registry.unblock_deletions(data_id);
    assert_eq!(registry.take_obsolete_renamings().len(), 1);
    assert!(registry.info_by_id(data_id).is_none());
}

#[test]
fn test_object_values_and_same_value_versions() {
    let mut registry = DataRegistry::new();
    let w = registry.register_main_access(&AccessParams::object(AccessMode::W, 99)).unwrap();
    let r1 = w.written_instance().unwrap().renaming();

    registry.set_object_version_value(&r1, Bytes::from_static(b"payload"));
    assert!(registry.is_here(&r1));

    let rw = registry.register_access(&AccessParams::object(AccessMode::RW, 99)).unwrap();
    let r2 = rw.written_instance().unwrap().renaming();
    assert!(!registry.is_here(&r2));

    registry.new_version_same_value(&r1, &r2);
    assert_eq!(registry.get_object_version_value(&r2), Some(Bytes::from_static(b"payload")));
}

#[test]
fn test_main_access_write_is_available_and_read_finishes() {
    let mut registry = DataRegistry::new();
    let w = registry.register_main_access(&AccessParams::file(AccessMode::W, "in.txt")).unwrap();
    assert!(registry.is_available(w.written_instance().unwrap()));

    let r = registry.register_main_access(&AccessParams::file(AccessMode::R, "in.txt")).unwrap();
    let version = registry.info_by_id(r.data_id()).unwrap().current_version().unwrap().readers;
    assert_eq!(version, 1);

    registry.finish_file_access(AccessMode::R, "in.txt").unwrap();
    let readers = registry.info_by_id(r.data_id()).unwrap().current_version().unwrap().readers;
    assert_eq!(readers, 0);
}
