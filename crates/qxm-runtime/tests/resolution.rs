//! Manager resolution across threads.
//!
//! Registrations and the override are process-wide, so every test here holds
//! `GUARD` and does its thread-local work on freshly spawned threads.

mod common;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use common::NullBackend;
use qxm_runtime::resolution::{
    activate_execution_manager, factory_symbol, is_resolved, register_execution_manager,
    register_execution_manager_factory, registered_execution_managers,
    set_execution_manager_override, with_execution_manager, with_registered_execution_manager,
};
use qxm_runtime::{
    BackendConfig, ExecutionManager, LeakPolicy, ManagerError, ManagerResult, RuntimeConfig,
};

static GUARD: Mutex<()> = Mutex::new(());

fn on_new_thread<R: Send + 'static>(f: impl FnOnce() -> R + Send + 'static) -> R {
    thread::spawn(f).join().unwrap()
}

fn backend_name() -> ManagerResult<String> {
    with_execution_manager(|em| Ok(em.backend_name().to_string()))
}

// ---------------------------------------------------------------------------
// Thread-local resolution
// ---------------------------------------------------------------------------

#[test]
fn test_each_thread_gets_its_own_manager() {
    let _guard = GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    register_execution_manager::<NullBackend>("per_thread");

    let ids = on_new_thread(|| {
        assert!(!is_resolved());
        let a = with_execution_manager(|em| em.allocate_qudit(2)).unwrap();
        assert!(is_resolved());
        let b = with_execution_manager(|em| em.allocate_qudit(2)).unwrap();
        (a.id, b.id)
    });
    assert_eq!(ids, (0, 1));

    // A second thread starts from an empty pool.
    let id = on_new_thread(|| with_execution_manager(|em| em.allocate_qudit(2)).unwrap().id);
    assert_eq!(id, 0);
}

#[test]
fn test_reregistration_leaves_built_managers_alone() {
    let _guard = GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    register_execution_manager::<NullBackend>("first");

    on_new_thread(|| {
        assert_eq!(backend_name().unwrap(), "first");
        register_execution_manager::<NullBackend>("second");
        assert_eq!(backend_name().unwrap(), "first");
        assert_eq!(on_new_thread(|| backend_name().unwrap()), "second");
    });
}

#[test]
fn test_reentrant_access_is_rejected() {
    let _guard = GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    register_execution_manager::<NullBackend>("reentrant");

    on_new_thread(|| {
        let err = with_execution_manager(|_| with_execution_manager(|_| Ok(()))).unwrap_err();
        assert!(err.is_protocol_violation());
        // The guard is released once the outer call returns.
        assert!(backend_name().is_ok());
    });
}

#[test]
fn test_factory_errors_propagate() {
    let _guard = GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    register_execution_manager_factory("broken", |_| {
        Err(ManagerError::ResourceExhaustion("no devices".into()))
    });

    on_new_thread(|| {
        let err = backend_name().unwrap_err();
        assert!(matches!(err, ManagerError::ResourceExhaustion(_)));
        assert!(!is_resolved());
    });
}

// ---------------------------------------------------------------------------
// Override
// ---------------------------------------------------------------------------

#[test]
fn test_override_takes_priority_on_every_thread() {
    let _guard = GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    register_execution_manager::<NullBackend>("default");

    let shared = Arc::new(Mutex::new(ExecutionManager::from_backend(NullBackend::named(
        "override",
    ))));
    set_execution_manager_override(Some(Arc::clone(&shared)));

    let a = on_new_thread(|| with_execution_manager(|em| em.allocate_qudit(2)).unwrap());
    let b = on_new_thread(|| with_execution_manager(|em| em.allocate_qudit(2)).unwrap());
    assert_ne!(a.id, b.id);
    assert_eq!(shared.lock().unwrap().num_live_qudits(), 2);
    assert_eq!(on_new_thread(|| backend_name().unwrap()), "override");

    set_execution_manager_override(None);
    assert_eq!(on_new_thread(|| backend_name().unwrap()), "default");

    let mut em = shared.lock().unwrap();
    em.return_qudit(a).unwrap();
    em.return_qudit(b).unwrap();
}

// ---------------------------------------------------------------------------
// Named factories
// ---------------------------------------------------------------------------

#[test]
fn test_named_factory_bypasses_default_and_override() {
    let _guard = GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    register_execution_manager::<NullBackend>("named_a");
    register_execution_manager::<NullBackend>("named_b");
    assert!(registered_execution_managers().contains(&factory_symbol("named_a")));

    let shared = Arc::new(Mutex::new(ExecutionManager::from_backend(NullBackend::named(
        "override",
    ))));
    set_execution_manager_override(Some(shared));

    on_new_thread(|| {
        let symbol = factory_symbol("named_a");
        let name =
            with_registered_execution_manager(&symbol, |em| Ok(em.backend_name().to_string()))
                .unwrap();
        assert_eq!(name, "named_a");

        // Cached per thread.
        let first = with_registered_execution_manager(&symbol, |em| em.allocate_qudit(2)).unwrap();
        let second = with_registered_execution_manager(&symbol, |em| em.allocate_qudit(2)).unwrap();
        assert_eq!((first.id, second.id), (0, 1));
    });

    set_execution_manager_override(None);
}

#[test]
fn test_activate_selects_named_backend() {
    let _guard = GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    register_execution_manager::<NullBackend>("activate_a");
    register_execution_manager::<NullBackend>("activate_b");

    activate_execution_manager(BackendConfig::new("activate_a"), LeakPolicy::Error).unwrap();
    assert_eq!(on_new_thread(|| backend_name().unwrap()), "activate_a");

    let config = RuntimeConfig {
        backend: "activate_b".to_string(),
        ..RuntimeConfig::default()
    };
    config.activate().unwrap();
    assert_eq!(on_new_thread(|| backend_name().unwrap()), "activate_b");

    let missing = RuntimeConfig {
        backend: "never_registered".to_string(),
        ..RuntimeConfig::default()
    };
    assert!(matches!(
        missing.activate(),
        Err(ManagerError::NoExecutionManager(_))
    ));
}
