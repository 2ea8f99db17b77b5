use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use tracing::trace;

use crate::container::scope::ServiceHandle;
use crate::errors::ContainerError;

/// Singleton instance cache with per-name creation locking and circular
/// reference detection.
///
/// State machine per name: not created -> in creation -> created. Creation
/// of one name never blocks creation of unrelated names; two threads
/// requesting the same name serialize on that name's lock, and the loser
/// reuses the winner's instance. A re-entrant request from the creating
/// thread itself either receives the early reference published during
/// property population or fails fast as a circular reference.
pub struct SingletonRegistry {
    singletons: RwLock<HashMap<String, ServiceHandle>>,
    /// References to allocated-but-not-yet-populated instances, visible only
    /// while the owning thread is still creating them
    early: Mutex<HashMap<String, ServiceHandle>>,
    /// Creation markers in begin order, with the owning thread
    in_creation: Mutex<Vec<(String, ThreadId)>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Names registered directly as singleton objects, without a definition
    manual: Mutex<HashSet<String>>,
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self {
            singletons: RwLock::new(HashMap::new()),
            early: Mutex::new(HashMap::new()),
            in_creation: Mutex::new(Vec::new()),
            locks: Mutex::new(HashMap::new()),
            manual: Mutex::new(HashSet::new()),
        }
    }

    /// Get the cached instance for a name, if fully created
    pub fn get(&self, name: &str) -> Result<Option<ServiceHandle>, ContainerError> {
        Ok(self
            .singletons
            .read()
            .map_err(|_| ContainerError::lock_poisoned("singletons"))?
            .get(name)
            .cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.singletons
            .read()
            .map(|s| s.contains_key(name))
            .unwrap_or(false)
    }

    /// Bind an externally constructed singleton object.
    ///
    /// Unlike definition overrides this conflict is terminal: a second
    /// binding under the same name always fails.
    pub fn register_external(
        &self,
        name: &str,
        instance: ServiceHandle,
    ) -> Result<(), ContainerError> {
        let mut singletons = self
            .singletons
            .write()
            .map_err(|_| ContainerError::lock_poisoned("singletons"))?;
        if singletons.contains_key(name) {
            return Err(ContainerError::SingletonAlreadyBound {
                name: name.to_string(),
            });
        }
        singletons.insert(name.to_string(), instance);
        self.manual
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("manual singletons"))?
            .insert(name.to_string());
        Ok(())
    }

    /// Names and instances of externally bound singleton objects
    pub fn manual_entries(&self) -> Result<Vec<(String, ServiceHandle)>, ContainerError> {
        let manual = self
            .manual
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("manual singletons"))?;
        let singletons = self
            .singletons
            .read()
            .map_err(|_| ContainerError::lock_poisoned("singletons"))?;
        Ok(manual
            .iter()
            .filter_map(|name| {
                singletons
                    .get(name)
                    .map(|handle| (name.clone(), handle.clone()))
            })
            .collect())
    }

    /// Expose an allocated instance to the creating thread before property
    /// population, so singleton reference cycles can close
    pub fn publish_early(&self, name: &str, instance: ServiceHandle) -> Result<(), ContainerError> {
        self.early
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("early singletons"))?
            .insert(name.to_string(), instance);
        Ok(())
    }

    /// Get-or-create with the full locking discipline.
    ///
    /// `create` runs with the per-name lock held and the in-creation marker
    /// set; it is expected to publish an early reference once the instance
    /// is allocated. `Ok(None)` means the factory legitimately produced no
    /// instance; nothing is cached and the name stays eligible for retry.
    pub fn get_or_create(
        &self,
        name: &str,
        create: impl FnOnce() -> Result<Option<ServiceHandle>, ContainerError>,
    ) -> Result<Option<ServiceHandle>, ContainerError> {
        if let Some(existing) = self.get(name)? {
            trace!(service = name, "singleton cache hit");
            return Ok(Some(existing));
        }

        // a re-entrant request from the creating thread must not try to take
        // the creation lock it already holds
        if self.creating_on_current_thread(name)? {
            if let Some(early) = self
                .early
                .lock()
                .map_err(|_| ContainerError::lock_poisoned("early singletons"))?
                .get(name)
                .cloned()
            {
                trace!(service = name, "returning early singleton reference");
                return Ok(Some(early));
            }
            return Err(ContainerError::circular_reference(
                name,
                self.current_thread_path(name)?,
            ));
        }

        let lock = self.creation_lock(name)?;
        let _guard = lock
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("singleton creation lock"))?;

        // another thread may have finished while this one waited
        if let Some(existing) = self.get(name)? {
            return Ok(Some(existing));
        }

        self.begin_creation(name)?;
        let result = create();
        match result {
            Ok(Some(instance)) => {
                self.complete(name, instance.clone())?;
                Ok(Some(instance))
            }
            Ok(None) => {
                self.creation_finished(name)?;
                Ok(None)
            }
            Err(err) => {
                self.creation_finished(name)?;
                Err(err)
            }
        }
    }

    /// Drop all cached instances, returning the drained entries
    pub fn clear(&self) -> Result<Vec<(String, ServiceHandle)>, ContainerError> {
        let mut singletons = self
            .singletons
            .write()
            .map_err(|_| ContainerError::lock_poisoned("singletons"))?;
        let drained = singletons.drain().collect();
        self.manual
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("manual singletons"))?
            .clear();
        Ok(drained)
    }

    pub fn len(&self) -> usize {
        self.singletons.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn creation_lock(&self, name: &str) -> Result<Arc<Mutex<()>>, ContainerError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("singleton locks"))?;
        Ok(locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    fn creating_on_current_thread(&self, name: &str) -> Result<bool, ContainerError> {
        let current = thread::current().id();
        Ok(self
            .in_creation
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("in-creation markers"))?
            .iter()
            .any(|(n, owner)| n == name && *owner == current))
    }

    /// Names the current thread is creating, oldest first, ending at the
    /// re-requested name; used for circular reference diagnostics
    fn current_thread_path(&self, name: &str) -> Result<String, ContainerError> {
        let current = thread::current().id();
        let mut path: Vec<String> = self
            .in_creation
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("in-creation markers"))?
            .iter()
            .filter(|(_, owner)| *owner == current)
            .map(|(n, _)| n.clone())
            .collect();
        path.push(name.to_string());
        Ok(path.join(" -> "))
    }

    fn begin_creation(&self, name: &str) -> Result<(), ContainerError> {
        self.in_creation
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("in-creation markers"))?
            .push((name.to_string(), thread::current().id()));
        Ok(())
    }

    fn creation_finished(&self, name: &str) -> Result<(), ContainerError> {
        self.early
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("early singletons"))?
            .remove(name);
        let mut in_creation = self
            .in_creation
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("in-creation markers"))?;
        if let Some(index) = in_creation.iter().rposition(|(n, _)| n == name) {
            in_creation.remove(index);
        }
        Ok(())
    }

    fn complete(&self, name: &str, instance: ServiceHandle) -> Result<(), ContainerError> {
        self.singletons
            .write()
            .map_err(|_| ContainerError::lock_poisoned("singletons"))?
            .insert(name.to_string(), instance);
        self.creation_finished(name)
    }
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("cached", &self.len())
            .finish()
    }
}
