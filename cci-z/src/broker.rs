//! Parameter registry.
//!
//! A [`Broker`] maps full parameter names to the parameters registered under
//! them, keeps an alias table and the init values supplied by configurators
//! ahead of construction, and owns the broker-level (pattern) callbacks.
//!
//! The broker never owns a parameter: the declaring component does. Entries
//! are weak references that the parameter removes when it is dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::callback::{
    self, AdapterTarget, CallbackAdapter, CallbackEvent, CallbackHandle, CallbackReturn,
    CallbackType, ObserverId,
};
use crate::config::BrokerBuilder;
use crate::error::{AccessError, Error, Result};
use crate::event::{ParamEvent, ParamEventKind};
use crate::lifecycle::Lifecycle;
use crate::name;
use crate::originator::Originator;
use crate::param::{Mutability, ParamBuilder, ParamHandle, ParamInner};
use crate::value::ParamValue;

#[derive(Debug)]
struct InitValue {
    text: String,
    consumed: bool,
}

#[derive(Default)]
struct Registry {
    params: HashMap<String, Weak<ParamInner>>,
    /// alias → canonical name
    aliases: HashMap<String, String>,
    init_values: HashMap<String, InitValue>,
    /// Broker-level adapters, in registration order.
    callbacks: Vec<Arc<CallbackAdapter>>,
}

impl Registry {
    fn live(&self, name: &str) -> Option<Arc<ParamInner>> {
        self.params.get(name).and_then(Weak::upgrade)
    }

    fn resolve(&self, name: &str) -> Option<Arc<ParamInner>> {
        let canonical = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.live(canonical)
    }

    fn matching<'a>(&'a self, pattern: &'a str) -> impl Iterator<Item = Arc<ParamInner>> + 'a {
        self.params
            .iter()
            .filter(move |(n, _)| name::matches(pattern, n))
            .filter_map(|(_, w)| w.upgrade())
    }
}

pub(crate) struct BrokerInner {
    name: String,
    lifecycle: Lifecycle,
    registry: Mutex<Registry>,
    subscribers: Mutex<Vec<flume::Sender<ParamEvent>>>,
}

impl BrokerInner {
    pub(crate) fn remove_adapter(&self, seq: usize) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.callbacks.len();
        registry.callbacks.retain(|a| a.seq() != seq);
        before != registry.callbacks.len()
    }
}

impl Drop for BrokerInner {
    fn drop(&mut self) {
        let callbacks = std::mem::take(&mut self.registry.get_mut().callbacks);
        for adapter in &callbacks {
            adapter.detach();
        }
        debug!(
            "[BRK] Dropped broker '{}', detached {} callback(s)",
            self.name,
            callbacks.len()
        );
    }
}

/// Handle to a parameter registry. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Create a broker with its own elaboration boundary and no init values.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), Lifecycle::new())
    }

    pub fn builder(name: impl Into<String>) -> BrokerBuilder {
        BrokerBuilder::new(name)
    }

    pub(crate) fn from_parts(name: String, lifecycle: Lifecycle) -> Self {
        info!("[BRK] Created broker '{}'", name);
        Self {
            inner: Arc::new(BrokerInner {
                name,
                lifecycle,
                registry: Mutex::new(Registry::default()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Elaboration boundary consulted by `elaboration_time` parameters.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    /// Whether both handles refer to the same registry.
    pub fn same_as(&self, other: &Broker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Non-owning handle for callbacks that need to reach back into this
    /// broker.
    pub fn downgrade(&self) -> WeakBroker {
        WeakBroker {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Start declaring a parameter owned by `originator`.
    ///
    /// The full name is `<originator object path>.<name>` unless the builder
    /// is switched to [`top_level`](ParamBuilder::top_level).
    pub fn create_param<T: ParamValue>(
        &self,
        originator: &Originator,
        name: impl Into<String>,
        default: T,
    ) -> ParamBuilder<T> {
        ParamBuilder {
            broker: self.clone(),
            originator: originator.clone(),
            name: name.into(),
            default,
            mutability: Mutability::default(),
            documentation: String::new(),
            top_level: false,
        }
    }

    // ── Registration ─────────────────────────────────────────────────────────

    pub(crate) fn add_param(&self, param: &Arc<ParamInner>) -> Result<()> {
        let name = param.name();
        {
            let mut registry = self.inner.registry.lock();
            if registry.live(name).is_some() {
                return Err(Error::DuplicateParam(name.to_string()));
            }
            if let Some(target) = registry.aliases.remove(name) {
                warn!(
                    "[BRK] Parameter '{}' replaces alias to '{}'",
                    name, target
                );
            }
            registry
                .params
                .insert(name.to_string(), Arc::downgrade(param));
        }
        debug!("[BRK] Added '{}' to '{}'", name, self.inner.name);

        let adapters = self.pattern_adapters(CallbackType::CreateParam, name);
        if !adapters.is_empty() {
            let handle = ParamHandle::from_inner(param.clone());
            let event = CallbackEvent::new(&handle, CallbackType::CreateParam, None);
            callback::dispatch(&adapters, &event);
        }
        self.emit(ParamEvent::new(
            ParamEventKind::Created,
            name,
            param.peek_string(),
        ));
        Ok(())
    }

    /// Fire `destroy_param` observers, then drop the registry entry.
    pub(crate) fn remove_param(&self, param: &Arc<ParamInner>) -> Result<()> {
        let name = param.name();
        let is_registered = |registry: &Registry| {
            registry
                .params
                .get(name)
                .is_some_and(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(param)))
        };
        if !is_registered(&*self.inner.registry.lock()) {
            return Err(Error::NotRegistered(name.to_string()));
        }

        let adapters = callback::merge_by_seq(
            param.own_adapters(CallbackType::DestroyParam),
            self.pattern_adapters(CallbackType::DestroyParam, name),
        );
        if !adapters.is_empty() {
            let handle = ParamHandle::from_inner(param.clone());
            let event = CallbackEvent::new(&handle, CallbackType::DestroyParam, None);
            callback::dispatch(&adapters, &event);
        }

        {
            let mut registry = self.inner.registry.lock();
            if !is_registered(&*registry) {
                return Err(Error::NotRegistered(name.to_string()));
            }
            registry.params.remove(name);
        }
        debug!("[BRK] Removed '{}' from '{}'", name, self.inner.name);
        self.emit(ParamEvent::new(ParamEventKind::Destroyed, name, None));
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Look up a parameter by name or alias (one hop).
    pub fn get_param(&self, name: &str) -> Option<ParamHandle> {
        self.inner
            .registry
            .lock()
            .resolve(name)
            .map(ParamHandle::from_inner)
    }

    pub fn exists_param(&self, name: &str) -> bool {
        self.inner.registry.lock().resolve(name).is_some()
    }

    /// Sorted names of all registered parameters matching `pattern`.
    ///
    /// Aliases never appear. The empty pattern lists everything.
    pub fn get_param_list(&self, pattern: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .registry
            .lock()
            .matching(pattern)
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Handles of all registered parameters matching `pattern`, sorted by name.
    pub fn get_params(&self, pattern: &str) -> Vec<ParamHandle> {
        let mut params: Vec<ParamHandle> = self
            .inner
            .registry
            .lock()
            .matching(pattern)
            .map(ParamHandle::from_inner)
            .collect();
        params.sort_by(|a, b| a.name().cmp(b.name()));
        params
    }

    /// Whether the named parameter's value has been read by anyone.
    ///
    /// `false` for names that are not registered.
    pub fn is_used(&self, name: &str) -> bool {
        self.get_param(name).is_some_and(|p| p.is_used())
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.inner
            .registry
            .lock()
            .params
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical text of a parameter's value, `None` if it is not registered.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get_param(name).and_then(|p| p.get_string().ok())
    }

    pub fn get_json(&self, name: &str) -> Option<serde_json::Value> {
        self.get_param(name).and_then(|p| p.get_json().ok())
    }

    /// Write a parameter by name through its canonical text.
    pub fn set_string(&self, name: &str, text: &str) -> std::result::Result<(), BrokerSetError> {
        let param = self
            .get_param(name)
            .ok_or_else(|| BrokerSetError::NotFound(name.to_string()))?;
        param.set_string(text).map_err(BrokerSetError::Access)
    }

    // ── Aliases ──────────────────────────────────────────────────────────────

    /// Make `alias` resolve to `original`.
    ///
    /// Fails if `alias` is the name of a registered parameter, or already an
    /// alias of a different registered parameter. An alias whose target is
    /// gone may be re-pointed.
    pub fn set_alias(&self, original: &str, alias: &str) -> Result<()> {
        if original == alias {
            return Err(Error::SelfAlias(alias.to_string()));
        }
        let mut registry = self.inner.registry.lock();
        let taken = registry
            .resolve(alias)
            .is_some_and(|current| current.name() != original);
        if taken {
            return Err(Error::AliasCollision {
                alias: alias.to_string(),
            });
        }
        registry
            .aliases
            .insert(alias.to_string(), original.to_string());
        debug!("[BRK] Alias '{}' -> '{}'", alias, original);
        Ok(())
    }

    // ── Init values ──────────────────────────────────────────────────────────

    /// Supply the value a parameter takes when it is constructed, in place of
    /// its compiled-in default.
    pub fn set_init_value(&self, name: &str, text: &str) -> Result<()> {
        serde_json::from_str::<serde_json::Value>(text).map_err(|e| Error::InvalidInitValue {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let mut registry = self.inner.registry.lock();
        if registry.resolve(name).is_some() {
            return Err(Error::ParamExists(name.to_string()));
        }
        registry.init_values.insert(
            name.to_string(),
            InitValue {
                text: text.to_string(),
                consumed: false,
            },
        );
        debug!("[BRK] Init value '{}' = {}", name, text);
        Ok(())
    }

    /// Init value stored for `name`, consumed or not.
    pub fn get_init_value(&self, name: &str) -> Option<String> {
        self.inner
            .registry
            .lock()
            .init_values
            .get(name)
            .map(|v| v.text.clone())
    }

    /// Init values no parameter has picked up yet, sorted by name.
    pub fn unconsumed_init_values(&self) -> Vec<(String, String)> {
        let mut values: Vec<(String, String)> = self
            .inner
            .registry
            .lock()
            .init_values
            .iter()
            .filter(|(_, v)| !v.consumed)
            .map(|(n, v)| (n.clone(), v.text.clone()))
            .collect();
        values.sort();
        values
    }

    pub(crate) fn consume_init_value(&self, name: &str) -> Option<String> {
        let mut registry = self.inner.registry.lock();
        let value = registry.init_values.get_mut(name)?;
        value.consumed = true;
        Some(value.text.clone())
    }

    // ── Callbacks ────────────────────────────────────────────────────────────

    /// Register a callback for every parameter whose name matches `pattern`,
    /// including parameters registered later.
    ///
    /// `*` subscribes to the whole broker. Each observer may hold one callback
    /// per (type, pattern).
    ///
    /// The broker owns `callback`. A closure that needs the broker must
    /// capture a [`WeakBroker`]: a captured `Broker` or [`ParamHandle`] clone
    /// keeps the registry alive after every other handle is gone.
    pub fn register_callback<F>(
        &self,
        callback_type: CallbackType,
        pattern: &str,
        observer: ObserverId,
        callback: F,
    ) -> Result<CallbackHandle>
    where
        F: Fn(&CallbackEvent<'_>) -> CallbackReturn + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        if registry.callbacks.iter().any(|a| {
            a.callback_type() == callback_type && a.observer() == observer && a.pattern() == pattern
        }) {
            return Err(Error::DuplicateCallback {
                observer,
                callback_type,
                target: pattern.to_string(),
            });
        }
        let adapter = CallbackAdapter::new(
            observer,
            callback_type,
            pattern.to_string(),
            AdapterTarget::Broker(Arc::downgrade(&self.inner)),
            Arc::new(callback),
        );
        registry.callbacks.push(adapter.clone());
        debug!(
            "[BRK] Registered {} callback for {} on pattern '{}'",
            callback_type, observer, pattern
        );
        Ok(CallbackHandle::new(adapter))
    }

    /// Remove every callback `observer` registered on this broker or on any
    /// of its parameters. Returns the number removed.
    pub fn unregister_all_callbacks(&self, observer: ObserverId) -> usize {
        let (removed, params) = {
            let mut registry = self.inner.registry.lock();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut registry.callbacks)
                .into_iter()
                .partition(|a| a.observer() == observer);
            registry.callbacks = kept;
            let params: Vec<ParamHandle> = registry
                .matching("")
                .map(ParamHandle::from_inner)
                .collect();
            (removed, params)
        };
        for adapter in &removed {
            adapter.detach();
        }
        let count = removed.len()
            + params
                .iter()
                .map(|p| p.unregister_all_callbacks(observer))
                .sum::<usize>();
        debug!("[BRK] Unregistered {} callback(s) of {}", count, observer);
        count
    }

    /// Whether any callback would fire for the named parameter, or for a
    /// parameter registered under that name later.
    pub fn has_callbacks(&self, name: &str) -> bool {
        match self.get_param(name) {
            Some(param) => param.has_callbacks(),
            None => self.has_pattern_callbacks(name),
        }
    }

    pub(crate) fn has_pattern_callbacks(&self, name: &str) -> bool {
        self.inner
            .registry
            .lock()
            .callbacks
            .iter()
            .any(|a| name::matches(a.pattern(), name))
    }

    /// Snapshot of broker-level adapters of one type matching `name`.
    pub(crate) fn pattern_adapters(
        &self,
        callback_type: CallbackType,
        name: &str,
    ) -> Vec<Arc<CallbackAdapter>> {
        self.inner
            .registry
            .lock()
            .callbacks
            .iter()
            .filter(|a| a.callback_type() == callback_type && name::matches(a.pattern(), name))
            .cloned()
            .collect()
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Receive a [`ParamEvent`] for every creation, change and destruction in
    /// this broker from now on.
    pub fn subscribe(&self) -> flume::Receiver<ParamEvent> {
        let (tx, rx) = flume::unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: ParamEvent) {
        let mut subscribers = self.inner.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                warn!("[BRK] Dropping disconnected event subscriber");
                false
            }
        });
    }
}

/// Weak counterpart of [`Broker`], obtained from [`Broker::downgrade`].
#[derive(Clone, Default)]
pub struct WeakBroker {
    inner: Weak<BrokerInner>,
}

impl WeakBroker {
    /// The broker, unless every strong handle has been dropped.
    pub fn upgrade(&self) -> Option<Broker> {
        self.inner.upgrade().map(|inner| Broker { inner })
    }
}

impl fmt::Debug for WeakBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBroker")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("name", &self.inner.name)
            .field("params", &self.len())
            .finish_non_exhaustive()
    }
}

/// Failure of [`Broker::set_string`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerSetError {
    #[error("parameter '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Access(#[from] AccessError),
}
