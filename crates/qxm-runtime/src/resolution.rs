//! Execution manager resolution.
//!
//! Each thread gets its own [`ExecutionManager`], built lazily by the default
//! factory on first access. A process-wide override, when installed, takes
//! priority on every thread.
//!
//! ```text
//!   with_execution_manager(f)
//!     ├─ override installed?  → lock it, run f
//!     └─ thread-local slot
//!          ├─ Unresolved → build with the default factory → Resolved
//!          └─ Resolved   → run f
//! ```
//!
//! Registering a backend installs two factories: the default used above, and
//! a named one under `get_registered_execution_manager_<name>` that
//! [`with_registered_execution_manager`] reaches directly.

use std::cell::{Cell, RefCell};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::backend::{BackendConfig, BackendFactory};
use crate::config::LeakPolicy;
use crate::error::{ManagerError, ManagerResult};
use crate::manager::ExecutionManager;

/// Prefix of every named factory symbol.
pub const FACTORY_PREFIX: &str = "get_registered_execution_manager_";

/// A manager shared across threads.
pub type SharedExecutionManager = Arc<Mutex<ExecutionManager>>;

type ManagerFactory = Arc<dyn Fn(&BackendConfig) -> ManagerResult<ExecutionManager> + Send + Sync>;

#[derive(Clone)]
struct DefaultFactory {
    factory: ManagerFactory,
    config: BackendConfig,
    leak_policy: LeakPolicy,
}

impl DefaultFactory {
    fn build(&self) -> ManagerResult<ExecutionManager> {
        Ok((self.factory)(&self.config)?.with_leak_policy(self.leak_policy))
    }
}

#[derive(Default)]
struct Registrations {
    default: Option<DefaultFactory>,
    named: FxHashMap<String, ManagerFactory>,
}

static REGISTRATIONS: LazyLock<RwLock<Registrations>> =
    LazyLock::new(|| RwLock::new(Registrations::default()));

static OVERRIDE: LazyLock<RwLock<Option<SharedExecutionManager>>> =
    LazyLock::new(|| RwLock::new(None));

thread_local! {
    static THREAD_MANAGER: RefCell<Option<ExecutionManager>> = const { RefCell::new(None) };
    static NAMED_MANAGERS: RefCell<FxHashMap<String, ExecutionManager>> =
        RefCell::new(FxHashMap::default());
    static IN_USE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the thread's manager as borrowed for the guard's lifetime.
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter() -> ManagerResult<Self> {
        if IN_USE.with(|flag| flag.replace(true)) {
            return Err(ManagerError::protocol(
                "execution manager accessed re-entrantly on the same thread",
            ));
        }
        Ok(ReentrancyGuard)
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_USE.with(|flag| flag.set(false));
    }
}

/// Named factory symbol for a backend name.
pub fn factory_symbol(name: &str) -> String {
    format!("{FACTORY_PREFIX}{name}")
}

/// Register backend `B` under `name`.
pub fn register_execution_manager<B: BackendFactory>(name: &str) {
    register_execution_manager_factory(name, |config| {
        Ok(ExecutionManager::from_backend(B::from_config(config)?))
    });
}

/// Register a manager factory under `name`.
///
/// The factory becomes the default for threads that have not resolved a
/// manager yet; managers already built are unaffected.
pub fn register_execution_manager_factory(
    name: &str,
    factory: impl Fn(&BackendConfig) -> ManagerResult<ExecutionManager> + Send + Sync + 'static,
) {
    let factory: ManagerFactory = Arc::new(factory);
    let mut registrations = REGISTRATIONS
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    registrations
        .named
        .insert(factory_symbol(name), Arc::clone(&factory));
    registrations.default = Some(DefaultFactory {
        factory,
        config: BackendConfig::new(name),
        leak_policy: LeakPolicy::default(),
    });
    info!("Registered execution manager: {}", name);
}

/// Make the backend registered as `config.name` the default, built with
/// `config` and `leak_policy`.
pub fn activate_execution_manager(config: BackendConfig, leak_policy: LeakPolicy) -> ManagerResult<()> {
    let mut registrations = REGISTRATIONS
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let factory = registrations
        .named
        .get(&factory_symbol(&config.name))
        .cloned()
        .ok_or_else(|| {
            ManagerError::NoExecutionManager(format!("no backend registered as '{}'", config.name))
        })?;
    info!("Activating execution manager: {}", config.name);
    registrations.default = Some(DefaultFactory {
        factory,
        config,
        leak_policy,
    });
    Ok(())
}

/// Symbols of every registered named factory, sorted.
pub fn registered_execution_managers() -> Vec<String> {
    let mut symbols: Vec<_> = REGISTRATIONS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .named
        .keys()
        .cloned()
        .collect();
    symbols.sort();
    symbols
}

/// Install or remove the process-wide override.
pub fn set_execution_manager_override(manager: Option<SharedExecutionManager>) {
    debug!(
        "{} execution manager override",
        if manager.is_some() { "Installing" } else { "Removing" }
    );
    *OVERRIDE.write().unwrap_or_else(PoisonError::into_inner) = manager;
}

/// The installed override, if any.
pub fn execution_manager_override() -> Option<SharedExecutionManager> {
    OVERRIDE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// True if this thread has built its own manager.
pub fn is_resolved() -> bool {
    THREAD_MANAGER.with(|slot| slot.try_borrow().map_or(true, |slot| slot.is_some()))
}

/// Run `f` against the current manager: the override if installed, else this
/// thread's manager, built on first access.
pub fn with_execution_manager<R>(
    f: impl FnOnce(&mut ExecutionManager) -> ManagerResult<R>,
) -> ManagerResult<R> {
    let _guard = ReentrancyGuard::enter()?;

    if let Some(shared) = execution_manager_override() {
        let mut manager = shared.lock().unwrap_or_else(PoisonError::into_inner);
        return f(&mut manager);
    }

    THREAD_MANAGER.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            let default = REGISTRATIONS
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .default
                .clone()
                .ok_or_else(|| {
                    ManagerError::NoExecutionManager("no default backend registered".into())
                })?;
            let manager = default.build()?;
            info!("Resolved execution manager for this thread: {}", manager.backend_name());
            *slot = Some(manager);
        }
        match slot.as_mut() {
            Some(manager) => f(manager),
            None => Err(ManagerError::NoExecutionManager(
                "thread-local manager unavailable".into(),
            )),
        }
    })
}

/// Run `f` against this thread's manager built by the named factory
/// `symbol`, bypassing the default resolution and the override.
pub fn with_registered_execution_manager<R>(
    symbol: &str,
    f: impl FnOnce(&mut ExecutionManager) -> ManagerResult<R>,
) -> ManagerResult<R> {
    let _guard = ReentrancyGuard::enter()?;

    NAMED_MANAGERS.with(|managers| {
        let mut managers = managers.borrow_mut();
        if !managers.contains_key(symbol) {
            let factory = REGISTRATIONS
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .named
                .get(symbol)
                .cloned()
                .ok_or_else(|| ManagerError::NoExecutionManager(symbol.to_string()))?;
            let name = symbol.strip_prefix(FACTORY_PREFIX).unwrap_or(symbol);
            let manager = factory(&BackendConfig::new(name))?;
            debug!("Built named execution manager: {}", symbol);
            managers.insert(symbol.to_string(), manager);
        }
        match managers.get_mut(symbol) {
            Some(manager) => f(manager),
            None => Err(ManagerError::NoExecutionManager(symbol.to_string())),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_symbol() {
        assert_eq!(
            factory_symbol("statevector"),
            "get_registered_execution_manager_statevector"
        );
        assert!(factory_symbol("x").starts_with(FACTORY_PREFIX));
    }

    #[test]
    fn test_unknown_named_factory() {
        let err = with_registered_execution_manager("get_registered_execution_manager_nope", |_| Ok(()));
        assert!(matches!(err, Err(ManagerError::NoExecutionManager(_))));
    }

    #[test]
    fn test_activate_unknown_backend() {
        let err = activate_execution_manager(BackendConfig::new("resolution_unit_missing"), LeakPolicy::Warn);
        assert!(matches!(err, Err(ManagerError::NoExecutionManager(_))));
    }
}
