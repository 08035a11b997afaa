//! Namespaced preference registry.
//!
//! Definitions are registered once at process start. Per-call resolution
//! reads durable values with get-or-initialize semantics and binds them
//! into a task-local slot, so nested drafting logic reads the active
//! values through [`current_prompts`] instead of threading them through
//! every signature.

pub mod prompt;

pub use prompt::{ConfigurablePrompt, ConfiguredPrompt, default_prompts, keys};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use futures::future::try_join_all;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RegistryError, StoreError};
use crate::store::{Namespace, PromptStore, RegistryEntry};

tokio::task_local! {
    static ACTIVE_PROMPTS: HashMap<String, ConfiguredPrompt>;
}

/// Read the prompt values bound by the enclosing [`PromptScope`].
///
/// Calling this outside an active scope is a programming error and fails
/// loudly rather than returning an empty map.
pub fn current_prompts() -> Result<HashMap<String, ConfiguredPrompt>, RegistryError> {
    ACTIVE_PROMPTS
        .try_with(|prompts| prompts.clone())
        .map_err(|_| RegistryError::NoContext)
}

/// Convenience lookup of a single bound prompt.
pub fn current_prompt(key: &str) -> Result<ConfiguredPrompt, RegistryError> {
    let prompts = current_prompts()?;
    prompts
        .get(key)
        .cloned()
        .ok_or_else(|| RegistryError::Unregistered { key: key.into() })
}

type InitLocks = Mutex<HashMap<(Namespace, String), Arc<Mutex<()>>>>;

/// The prompt registry: definitions plus per-key initialization locks.
///
/// Read-heavy and append-only after startup registration. Most callers use
/// the process-wide [`global`] instance.
#[derive(Debug)]
pub struct Registry {
    registered: RwLock<HashMap<String, ConfigurablePrompt>>,
    init_locks: InitLocks,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            registered: RwLock::new(HashMap::new()),
            init_locks: Mutex::new(HashMap::new()),
        }
    }

    /// A registry pre-loaded with the built-in preference prompts.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry
            .register(default_prompts())
            .expect("built-in prompt definitions are valid");
        registry
    }

    /// Register prompt definitions, returning their keys.
    ///
    /// Idempotent: re-registering a key overwrites the stored definition,
    /// never any durable value already initialized from it.
    pub fn register(
        &self,
        prompts: impl IntoIterator<Item = ConfigurablePrompt>,
    ) -> Result<Vec<String>, RegistryError> {
        let mut keys = Vec::new();
        let mut registered = self.registered.write().expect("registry lock poisoned");
        for prompt in prompts {
            prompt.validate()?;
            keys.push(prompt.key.clone());
            registered.insert(prompt.key.clone(), prompt);
        }
        Ok(keys)
    }

    /// Register definitions given as raw mappings, normalizing each.
    pub fn register_raw(
        &self,
        prompts: impl IntoIterator<Item = serde_json::Value>,
    ) -> Result<Vec<String>, RegistryError> {
        let normalized = prompts
            .into_iter()
            .map(ConfigurablePrompt::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.register(normalized)
    }

    /// Whether a key has been registered.
    pub fn is_registered(&self, key: &str) -> bool {
        self.registered
            .read()
            .expect("registry lock poisoned")
            .contains_key(key)
    }

    /// Build a scope over the given keys.
    ///
    /// Fails here, before any work runs, if any key was never registered.
    pub fn with_prompts(&self, keys: &[&str]) -> Result<PromptScope<'_>, RegistryError> {
        let registered = self.registered.read().expect("registry lock poisoned");
        let mut prompts = Vec::with_capacity(keys.len());
        for key in keys {
            let prompt = registered
                .get(*key)
                .cloned()
                .ok_or_else(|| RegistryError::Unregistered {
                    key: (*key).to_string(),
                })?;
            prompts.push(prompt);
        }
        Ok(PromptScope {
            registry: self,
            prompts,
        })
    }

    /// Get-or-initialize the value for one `(namespace, key)`.
    ///
    /// The read-then-maybe-write runs under a per-key async mutex so two
    /// concurrent initializations in this process cannot interleave; the
    /// store's atomic per-key `put` (last-writer-wins) covers writers in
    /// other processes.
    async fn resolve(
        &self,
        store: &dyn PromptStore,
        namespace: &Namespace,
        prompt: &ConfigurablePrompt,
    ) -> Result<String, StoreError> {
        let lock = self.init_lock(namespace, &prompt.key).await;
        let _guard = lock.lock().await;

        if let Some(entry) = store.get(namespace, &prompt.key).await?
            && !entry.data.is_empty()
        {
            return Ok(entry.data);
        }

        debug!(namespace = %namespace, key = %prompt.key, "Initializing prompt value from default");
        let value = prompt.instructions.clone();
        store
            .put(namespace, &prompt.key, RegistryEntry::new(value.clone()))
            .await?;
        Ok(value)
    }

    async fn init_lock(&self, namespace: &Namespace, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.init_locks.lock().await;
        locks
            .entry((namespace.clone(), key.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, created on first use with the built-in
/// prompts registered. Additional definitions can be registered at
/// startup; there is no teardown.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::with_defaults)
}

/// A validated set of prompt definitions ready to resolve and bind.
#[derive(Debug)]
pub struct PromptScope<'r> {
    registry: &'r Registry,
    prompts: Vec<ConfigurablePrompt>,
}

impl PromptScope<'_> {
    /// Resolve all keys concurrently, bind the values for the duration of
    /// `work`, and release the binding on every exit path.
    ///
    /// The binding is strictly nested: entering a scope inside another
    /// shadows the outer values, which are restored when the inner scope
    /// exits.
    pub async fn enter<F>(
        &self,
        store: &dyn PromptStore,
        namespace: &Namespace,
        work: F,
    ) -> Result<F::Output, StoreError>
    where
        F: Future,
    {
        let configured = try_join_all(self.prompts.iter().map(|prompt| async {
            let value = self.registry.resolve(store, namespace, prompt).await?;
            Ok::<_, StoreError>((
                prompt.key.clone(),
                ConfiguredPrompt {
                    definition: prompt.clone(),
                    value,
                },
            ))
        }))
        .await?;

        let bound: HashMap<String, ConfiguredPrompt> = configured.into_iter().collect();
        Ok(ACTIVE_PROMPTS.scope(bound, work).await)
    }
}
