use std::sync::Mutex;

use tracing::{debug, warn};

use crate::container::definition::LifecycleCallback;
use crate::container::scope::ServiceHandle;
use crate::errors::ContainerError;

/// Framework-level initialization hook, run after property population and
/// before any named init callback
pub trait Initializable: Send + Sync {
    fn initialize(&self) -> Result<(), ContainerError>;
}

/// Framework-level disposal hook, run at container shutdown
pub trait Disposable: Send + Sync {
    fn dispose(&self) -> Result<(), ContainerError>;
}

/// A destruction failure reported from shutdown
#[derive(Debug)]
pub struct DisposalFailure {
    pub service: String,
    pub callback: String,
    pub error: ContainerError,
}

struct DisposalEntry {
    name: String,
    instance: ServiceHandle,
    callbacks: Vec<LifecycleCallback>,
}

/// Tracks completed singletons that carry destroy callbacks and runs them
/// in reverse completion order at shutdown.
///
/// Completion order follows dependency order (a dependency finishes
/// creating before its dependent), so reverse order destroys dependents
/// before the services they rely on. A failing callback is reported and
/// the remaining destructions still run.
pub struct DisposalRegistry {
    entries: Mutex<Vec<DisposalEntry>>,
}

impl DisposalRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Track a completed singleton; re-registration under the same name
    /// replaces the previous entry
    pub fn register(
        &self,
        name: &str,
        instance: ServiceHandle,
        callbacks: Vec<LifecycleCallback>,
    ) -> Result<(), ContainerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("disposal entries"))?;
        entries.retain(|e| e.name != name);
        entries.push(DisposalEntry {
            name: name.to_string(),
            instance,
            callbacks,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every destroy callback once, newest singleton first, collecting
    /// failures instead of aborting
    pub fn dispose_all(&self) -> Vec<DisposalFailure> {
        let entries = match self.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(_) => return Vec::new(),
        };

        let mut failures = Vec::new();
        for entry in entries.into_iter().rev() {
            debug!(service = entry.name.as_str(), "disposing singleton");
            for callback in &entry.callbacks {
                if let Err(error) = callback.invoke(entry.instance.as_ref()) {
                    warn!(
                        service = entry.name.as_str(),
                        callback = callback.name(),
                        %error,
                        "destroy callback failed, continuing"
                    );
                    failures.push(DisposalFailure {
                        service: entry.name.clone(),
                        callback: callback.name().to_string(),
                        error,
                    });
                }
            }
        }
        failures
    }
}

impl Default for DisposalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DisposalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalRegistry")
            .field("tracked", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Resource;

    fn order_callback(
        name: &str,
        log: Arc<Mutex<Vec<String>>>,
    ) -> LifecycleCallback {
        let tag = name.to_string();
        LifecycleCallback::new(name, move |_: &Resource| {
            log.lock().unwrap().push(tag.clone());
            Ok(())
        })
    }

    #[test]
    fn test_disposal_runs_in_reverse_registration_order() {
        let registry = DisposalRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            registry
                .register(
                    name,
                    Arc::new(Resource) as ServiceHandle,
                    vec![order_callback(name, log.clone())],
                )
                .unwrap();
        }

        let failures = registry.dispose_all();
        assert!(failures.is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["third".to_string(), "second".to_string(), "first".to_string()]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_disposal_continues_past_failures() {
        let registry = DisposalRegistry::new();
        let survivors = Arc::new(AtomicUsize::new(0));

        registry
            .register(
                "healthy-early",
                Arc::new(Resource) as ServiceHandle,
                vec![{
                    let survivors = survivors.clone();
                    LifecycleCallback::new("close", move |_: &Resource| {
                        survivors.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }],
            )
            .unwrap();
        registry
            .register(
                "broken",
                Arc::new(Resource) as ServiceHandle,
                vec![LifecycleCallback::new("close", |_: &Resource| {
                    Err(ContainerError::illegal_state("already closed"))
                })],
            )
            .unwrap();

        let failures = registry.dispose_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].service, "broken");
        assert_eq!(failures[0].callback, "close");
        // the earlier-registered healthy service was still destroyed
        assert_eq!(survivors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reregistration_replaces_entry() {
        let registry = DisposalRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(
                "svc",
                Arc::new(Resource) as ServiceHandle,
                vec![order_callback("old", log.clone())],
            )
            .unwrap();
        registry
            .register(
                "svc",
                Arc::new(Resource) as ServiceHandle,
                vec![order_callback("new", log.clone())],
            )
            .unwrap();

        registry.dispose_all();
        assert_eq!(*log.lock().unwrap(), vec!["new".to_string()]);
    }
}
