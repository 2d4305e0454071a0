use crate::domain::resource::core_element::CoreRegistry;
use crate::domain::resource::profile::Profile;
use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::resource::worker::Worker;
use crate::domain::utils::id::WorkerId;

#[test]
fn test_reduce_common_takes_what_is_offered() {
    let mut gap = ResourceDescription::new(2, 1024);
    let mut pending = ResourceDescription::new(3, 512);

    let taken = gap.reduce_common(&mut pending);

    assert_eq!(taken, ResourceDescription::new(2, 512));
    assert_eq!(gap, ResourceDescription::new(0, 512));
    assert_eq!(pending, ResourceDescription::new(1, 0));
    assert!(!pending.is_useless());
    assert!(!gap.is_useless());
}

#[test]
fn test_can_host_is_per_dimension() {
    let capacity = ResourceDescription::new(4, 2048);
    assert!(capacity.can_host(&ResourceDescription::new(4, 0)));
    assert!(!capacity.can_host(&ResourceDescription::new(1, 4096)));
    assert!(ResourceDescription::default().is_useless());
}

#[test]
fn test_profile_seed_is_replaced_by_first_measurement() {
    let mut profile = Profile::new(Some(100));
    assert_eq!(profile.expected_duration(), 100);

    profile.update(40);
    assert_eq!(profile.average_ms(), Some(40));

    profile.update(60);
    assert_eq!(profile.average_ms(), Some(50));
    assert_eq!(profile.min_ms(), Some(40));
    assert_eq!(profile.max_ms(), Some(60));
}

#[test]
fn test_profile_without_history_plans_zero() {
    assert_eq!(Profile::new(None).expected_duration(), 0);
    assert_eq!(Profile::new(Some(-5)).expected_duration(), 0);
}

#[test]
fn test_worker_reserve_and_release() {
    let mut worker = Worker::new(WorkerId::new(0), "w0", ResourceDescription::units(2));
    let one = ResourceDescription::units(1);

    assert!(worker.reserve(&one));
    assert!(worker.reserve(&one));
    assert!(!worker.reserve(&one));

    worker.release(&one);
    assert_eq!(worker.available(), one);

    // Over-release is clamped back to the capacity.
    worker.release(&one);
    worker.release(&one);
    assert_eq!(worker.available(), ResourceDescription::units(2));
}

#[test]
fn test_core_registry_rejects_duplicates() {
    let mut registry = CoreRegistry::new();
    let core = registry.register("matmul", vec![(ResourceDescription::units(1), Some(10))]).unwrap();

    assert_eq!(registry.core_id("matmul"), Some(core));
    assert_eq!(registry.implementations(core).len(), 1);
    assert!(registry.register("matmul", vec![]).is_err());
}
