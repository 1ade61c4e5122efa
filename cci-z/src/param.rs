//! Parameters: named, typed values with lock state and observers.
//!
//! The declaring component owns a [`Param<T>`]. Dropping it deregisters the
//! parameter from its broker, notifies `destroy_param` observers and detaches
//! every callback adapter. Everyone else (configurators, tools, callbacks)
//! works through untyped [`ParamHandle`]s obtained from the broker.
//!
//! # Write path
//!
//! ```text
//! set(value[, token])
//!   ├── pre_write callbacks (all run; any rejection vetoes)
//!   ├── mutability check (immutable / elaboration_time)
//!   ├── lock check (unlocked / locked / locked with token)
//!   ├── apply value
//!   └── post_write callbacks
//! ```
//!
//! No lock is held while callbacks run, so callbacks may read or write any
//! parameter, including the one that triggered them.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::broker::Broker;
use crate::callback::{
    self, AdapterTarget, CallbackAdapter, CallbackEvent, CallbackFn, CallbackHandle,
    CallbackReturn, CallbackType, ObserverId,
};
use crate::error::{AccessError, Error, Result};
use crate::event::{ParamEvent, ParamEventKind};
use crate::originator::Originator;
use crate::value::{self, ErasedValue, ParamValue, TypedValue};
use crate::{Builder, GlobalCounter, name};

static LOCK_TOKENS: GlobalCounter = GlobalCounter::new();

/// Write policy of a parameter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum Mutability {
    #[default]
    Mutable,
    /// Writable only until an explicit value has been applied.
    Immutable,
    /// Writable only until the end of elaboration.
    ElaborationTime,
    /// Vendor-specific policy; treated as mutable.
    Other,
}

/// Proof of having locked a parameter with a password.
///
/// Tokens are never reused, so holding one is the only way to unlock the
/// parameter or to write through the lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(usize);

impl LockToken {
    fn fresh() -> Self {
        Self(LOCK_TOKENS.increment())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LockState {
    Unlocked,
    Locked,
    LockedWithToken(LockToken),
}

#[derive(Debug)]
struct ParamState {
    value: Box<dyn ErasedValue>,
    lock: LockState,
    documentation: String,
    explicit: bool,
    used: bool,
    invalid: bool,
}

pub(crate) struct ParamInner {
    name: String,
    originator: Originator,
    mutability: Mutability,
    broker: Broker,
    state: Mutex<ParamState>,
    adapters: Mutex<Vec<Arc<CallbackAdapter>>>,
    destroyed: AtomicBool,
}

impl ParamInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Canonical text of the value without running `pre_read` or marking the
    /// parameter used.
    pub(crate) fn peek_string(&self) -> Option<String> {
        self.state.lock().value.pack().ok()
    }

    pub(crate) fn remove_adapter(&self, seq: usize) -> bool {
        let mut adapters = self.adapters.lock();
        let before = adapters.len();
        adapters.retain(|a| a.seq() != seq);
        before != adapters.len()
    }

    /// Parameter-level adapters of one type, without the broker-level ones.
    pub(crate) fn own_adapters(&self, callback_type: CallbackType) -> Vec<Arc<CallbackAdapter>> {
        self.adapters
            .lock()
            .iter()
            .filter(|a| a.callback_type() == callback_type)
            .cloned()
            .collect()
    }

    fn check_alive(&self) -> std::result::Result<(), AccessError> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(AccessError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Deregister from the broker and cut every adapter's back-reference.
    fn destroy(self: &Arc<Self>) {
        if let Err(e) = self.broker.remove_param(self) {
            error!("[PAR] Failed to deregister '{}': {}", self.name, e);
        }
        self.destroyed.store(true, Ordering::Release);

        let adapters = std::mem::take(&mut *self.adapters.lock());
        for adapter in &adapters {
            adapter.detach();
        }
        debug!(
            "[PAR] Destroyed '{}', detached {} callback(s)",
            self.name,
            adapters.len()
        );
    }
}

/// Untyped, cloneable handle to a registered parameter.
#[derive(Clone)]
pub struct ParamHandle {
    inner: Arc<ParamInner>,
}

impl ParamHandle {
    pub(crate) fn from_inner(inner: Arc<ParamInner>) -> Self {
        Self { inner }
    }

    /// Full hierarchical name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn originator(&self) -> &Originator {
        &self.inner.originator
    }

    pub fn mutability(&self) -> Mutability {
        self.inner.mutability
    }

    /// Broker this parameter is registered with for its whole lifetime.
    pub fn broker(&self) -> &Broker {
        &self.inner.broker
    }

    pub fn type_name(&self) -> &'static str {
        self.inner.state.lock().value.type_name()
    }

    pub fn documentation(&self) -> String {
        self.inner.state.lock().documentation.clone()
    }

    pub fn set_documentation(&self, doc: impl Into<String>) {
        self.inner.state.lock().documentation = doc.into();
    }

    /// `false` once the owning component has dropped the parameter.
    pub fn is_valid(&self) -> bool {
        !self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Whether the value has ever been read.
    pub fn is_used(&self) -> bool {
        self.inner.state.lock().used
    }

    /// Whether a value other than the compiled-in default has been applied.
    pub fn is_explicit(&self) -> bool {
        self.inner.state.lock().explicit
    }

    pub fn is_invalid(&self) -> bool {
        self.inner.state.lock().invalid
    }

    /// Flag the current value as invalid until the next successful write.
    pub fn set_invalid(&self) {
        self.inner.state.lock().invalid = true;
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.lock().lock != LockState::Unlocked
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Canonical text of the current value.
    pub fn get_string(&self) -> std::result::Result<String, AccessError> {
        self.read()?.pack()
    }

    pub fn get_json(&self) -> std::result::Result<serde_json::Value, AccessError> {
        self.read()?.to_json()
    }

    /// Typed read; fails cleanly when `T` is not the parameter's type.
    pub fn try_get<T: ParamValue>(&self) -> std::result::Result<T, AccessError> {
        self.read()?.try_get::<T>()
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Write a value given as canonical text.
    ///
    /// Malformed text fails before any observer runs and leaves the value
    /// unchanged.
    pub fn set_string(&self, text: &str) -> std::result::Result<(), AccessError> {
        self.set_string_impl(text, None)
    }

    pub fn set_string_with_token(
        &self,
        text: &str,
        token: &LockToken,
    ) -> std::result::Result<(), AccessError> {
        self.set_string_impl(text, Some(token))
    }

    pub fn set_json(&self, json: serde_json::Value) -> std::result::Result<(), AccessError> {
        self.set_json_impl(json, None)
    }

    pub fn set_json_with_token(
        &self,
        json: serde_json::Value,
        token: &LockToken,
    ) -> std::result::Result<(), AccessError> {
        self.set_json_impl(json, Some(token))
    }

    /// Typed write; fails cleanly when `T` is not the parameter's type.
    pub fn try_set<T: ParamValue>(&self, value: T) -> std::result::Result<(), AccessError> {
        self.try_set_impl(value, None)
    }

    pub fn try_set_with_token<T: ParamValue>(
        &self,
        value: T,
        token: &LockToken,
    ) -> std::result::Result<(), AccessError> {
        self.try_set_impl(value, Some(token))
    }

    // ── Locking ──────────────────────────────────────────────────────────────

    /// Lock without a password. Anyone may [`unlock`](Self::unlock) it again.
    pub fn lock(&self) -> std::result::Result<(), AccessError> {
        self.inner.check_alive()?;
        let mut state = self.inner.state.lock();
        if state.lock != LockState::Unlocked {
            return Err(AccessError::AlreadyLocked);
        }
        state.lock = LockState::Locked;
        debug!("[PAR] Locked '{}'", self.inner.name);
        Ok(())
    }

    /// Lock with a password. Only the returned token unlocks the parameter or
    /// writes through the lock.
    pub fn lock_with_token(&self) -> std::result::Result<LockToken, AccessError> {
        self.inner.check_alive()?;
        let mut state = self.inner.state.lock();
        if state.lock != LockState::Unlocked {
            return Err(AccessError::AlreadyLocked);
        }
        let token = LockToken::fresh();
        state.lock = LockState::LockedWithToken(token.clone());
        debug!("[PAR] Locked '{}' with password", self.inner.name);
        Ok(token)
    }

    /// Remove a lock taken without password.
    pub fn unlock(&self) -> std::result::Result<(), AccessError> {
        self.inner.check_alive()?;
        let mut state = self.inner.state.lock();
        match state.lock {
            LockState::Unlocked => Err(AccessError::NotLocked),
            LockState::Locked => {
                state.lock = LockState::Unlocked;
                debug!("[PAR] Unlocked '{}'", self.inner.name);
                Ok(())
            }
            LockState::LockedWithToken(_) => Err(AccessError::WrongToken),
        }
    }

    /// Remove a lock. A password lock only yields to its own token; a plain
    /// lock yields to any token.
    pub fn unlock_with_token(&self, token: &LockToken) -> std::result::Result<(), AccessError> {
        self.inner.check_alive()?;
        let mut state = self.inner.state.lock();
        match &state.lock {
            LockState::Unlocked => Err(AccessError::NotLocked),
            LockState::LockedWithToken(stored) if stored != token => Err(AccessError::WrongToken),
            LockState::Locked | LockState::LockedWithToken(_) => {
                state.lock = LockState::Unlocked;
                debug!("[PAR] Unlocked '{}' with password", self.inner.name);
                Ok(())
            }
        }
    }

    // ── Callbacks ────────────────────────────────────────────────────────────

    /// Register a callback on this parameter.
    ///
    /// Each observer may hold at most one callback per type on a parameter.
    /// `create_param` callbacks belong on the broker.
    pub fn register_callback<F>(
        &self,
        callback_type: CallbackType,
        observer: ObserverId,
        callback: F,
    ) -> Result<CallbackHandle>
    where
        F: Fn(&CallbackEvent<'_>) -> CallbackReturn + Send + Sync + 'static,
    {
        self.register_callback_fn(callback_type, observer, Arc::new(callback))
    }

    pub(crate) fn register_callback_fn(
        &self,
        callback_type: CallbackType,
        observer: ObserverId,
        func: CallbackFn,
    ) -> Result<CallbackHandle> {
        if callback_type == CallbackType::CreateParam {
            return Err(Error::UnsupportedCallback(callback_type));
        }
        let mut adapters = self.inner.adapters.lock();
        if adapters
            .iter()
            .any(|a| a.callback_type() == callback_type && a.observer() == observer)
        {
            return Err(Error::DuplicateCallback {
                observer,
                callback_type,
                target: self.inner.name.clone(),
            });
        }
        let adapter = CallbackAdapter::new(
            observer,
            callback_type,
            self.inner.name.clone(),
            AdapterTarget::Param(Arc::downgrade(&self.inner)),
            func,
        );
        adapters.push(adapter.clone());
        debug!(
            "[PAR] Registered {} callback for {} on '{}'",
            callback_type, observer, self.inner.name
        );
        Ok(CallbackHandle::new(adapter))
    }

    /// Unregister one callback. Returns `false` if it was not registered here.
    pub fn unregister_callback(&self, handle: &CallbackHandle) -> bool {
        let owned = self
            .inner
            .adapters
            .lock()
            .iter()
            .any(|a| a.seq() == handle.seq());
        owned && handle.unregister()
    }

    /// Unregister every callback `observer` holds on this parameter.
    ///
    /// Returns the number of callbacks removed.
    pub fn unregister_all_callbacks(&self, observer: ObserverId) -> usize {
        let removed: Vec<Arc<CallbackAdapter>> = {
            let mut adapters = self.inner.adapters.lock();
            let (removed, kept) = std::mem::take(&mut *adapters)
                .into_iter()
                .partition(|a| a.observer() == observer);
            *adapters = kept;
            removed
        };
        for adapter in &removed {
            adapter.detach();
        }
        removed.len()
    }

    /// Whether any callback (own or broker-level pattern) targets this parameter.
    pub fn has_callbacks(&self) -> bool {
        let has_own = !self.inner.adapters.lock().is_empty();
        has_own || self.inner.broker.has_pattern_callbacks(self.name())
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn adapters_for(&self, callback_type: CallbackType) -> Vec<Arc<CallbackAdapter>> {
        callback::merge_by_seq(
            self.inner.own_adapters(callback_type),
            self.inner
                .broker
                .pattern_adapters(callback_type, &self.inner.name),
        )
    }

    fn read(&self) -> std::result::Result<Box<dyn ErasedValue>, AccessError> {
        self.inner.check_alive()?;
        let adapters = self.adapters_for(CallbackType::PreRead);
        if !adapters.is_empty() {
            let event = CallbackEvent::new(self, CallbackType::PreRead, None);
            callback::dispatch(&adapters, &event);
        }
        let mut state = self.inner.state.lock();
        state.used = true;
        Ok(state.value.clone())
    }

    fn set_string_impl(
        &self,
        text: &str,
        token: Option<&LockToken>,
    ) -> std::result::Result<(), AccessError> {
        self.inner.check_alive()?;
        let current = self.inner.state.lock().value.clone();
        let proposed = value::decode_like(current.as_ref(), text).inspect_err(|e| {
            warn!("[PAR] Rejected text for '{}': {}", self.inner.name, e);
        })?;
        self.write(proposed, token)
    }

    fn set_json_impl(
        &self,
        json: serde_json::Value,
        token: Option<&LockToken>,
    ) -> std::result::Result<(), AccessError> {
        self.inner.check_alive()?;
        let mut proposed = self.inner.state.lock().value.clone();
        proposed.assign_json(json)?;
        self.write(proposed, token)
    }

    fn try_set_impl<T: ParamValue>(
        &self,
        value: T,
        token: Option<&LockToken>,
    ) -> std::result::Result<(), AccessError> {
        self.inner.check_alive()?;
        let actual = {
            let state = self.inner.state.lock();
            if state.value.try_as::<T>().is_some() {
                None
            } else {
                Some(state.value.type_name())
            }
        };
        if let Some(actual) = actual {
            return Err(AccessError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual,
            });
        }
        self.write(Box::new(TypedValue(value)), token)
    }

    fn write(
        &self,
        proposed: Box<dyn ErasedValue>,
        token: Option<&LockToken>,
    ) -> std::result::Result<(), AccessError> {
        if let Err(e) = proposed.pack_checked() {
            warn!("[PAR] Rejected value for '{}': {}", self.inner.name, e);
            return Err(e);
        }
        let pre_write = self.adapters_for(CallbackType::PreWrite);
        if !pre_write.is_empty() {
            let event = CallbackEvent::new(self, CallbackType::PreWrite, Some(proposed.as_ref()));
            let outcome = callback::dispatch(&pre_write, &event);
            if !outcome.rejected_by.is_empty() {
                warn!(
                    "[PAR] Write to '{}' vetoed by {:?}",
                    self.inner.name, outcome.rejected_by
                );
                return Err(AccessError::Rejected {
                    observers: outcome.rejected_by,
                });
            }
        }

        let packed = {
            let mut state = self.inner.state.lock();
            self.check_writable(&state, token)?;
            state.value.assign(proposed.as_ref())?;
            state.explicit = true;
            state.invalid = false;
            state.value.pack().ok()
        };
        debug!("[PAR] Set '{}' = {:?}", self.inner.name, packed);

        let post_write = self.adapters_for(CallbackType::PostWrite);
        if !post_write.is_empty() {
            let event = CallbackEvent::new(self, CallbackType::PostWrite, None);
            callback::dispatch(&post_write, &event);
        }
        self.inner.broker.emit(ParamEvent::new(
            ParamEventKind::Changed,
            &self.inner.name,
            packed,
        ));
        Ok(())
    }

    fn check_writable(
        &self,
        state: &ParamState,
        token: Option<&LockToken>,
    ) -> std::result::Result<(), AccessError> {
        // Re-check: a pre_write callback may have outlived the owner
        self.inner.check_alive()?;
        match self.inner.mutability {
            Mutability::Immutable if state.explicit => return Err(AccessError::Immutable),
            Mutability::ElaborationTime
                if self.inner.broker.lifecycle().is_elaboration_closed() =>
            {
                return Err(AccessError::ElaborationClosed);
            }
            _ => {}
        }
        match (&state.lock, token) {
            (LockState::Unlocked, _) => Ok(()),
            (LockState::Locked, _) => Err(AccessError::Locked),
            (LockState::LockedWithToken(stored), Some(token)) if stored == token => Ok(()),
            (LockState::LockedWithToken(_), Some(_)) => Err(AccessError::WrongToken),
            (LockState::LockedWithToken(_), None) => Err(AccessError::Locked),
        }
    }
}

impl PartialEq for ParamHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ParamHandle {}

impl fmt::Debug for ParamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamHandle")
            .field("name", &self.inner.name)
            .field("mutability", &self.inner.mutability)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

/// A parameter owned by the component that declared it.
///
/// Dereferences to [`ParamHandle`] for the untyped surface (locking,
/// callbacks, metadata).
pub struct Param<T: ParamValue> {
    handle: ParamHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ParamValue> Param<T> {
    /// Current value. Runs `pre_read` callbacks and marks the parameter used.
    pub fn get(&self) -> T {
        match self.handle.try_get::<T>() {
            Ok(value) => value,
            // The owner keeps the parameter alive and its type is fixed
            Err(e) => unreachable!("parameter '{}' unreadable by its owner: {}", self.name(), e),
        }
    }

    pub fn set(&self, value: T) -> std::result::Result<(), AccessError> {
        self.handle.try_set_impl(value, None)
    }

    /// Write through a password lock.
    pub fn set_with_token(
        &self,
        value: T,
        token: &LockToken,
    ) -> std::result::Result<(), AccessError> {
        self.handle.try_set_impl(value, Some(token))
    }

    pub fn handle(&self) -> &ParamHandle {
        &self.handle
    }
}

impl<T: ParamValue> Deref for Param<T> {
    type Target = ParamHandle;

    fn deref(&self) -> &ParamHandle {
        &self.handle
    }
}

impl<T: ParamValue> Drop for Param<T> {
    fn drop(&mut self) {
        self.handle.inner.destroy();
    }
}

impl<T: ParamValue> fmt::Debug for Param<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.handle.inner.name)
            .field("type", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Param<T>`]; obtain one from
/// [`Broker::create_param`] or
/// [`BrokerResolver::create_param`](crate::resolver::BrokerResolver::create_param).
pub struct ParamBuilder<T: ParamValue> {
    pub(crate) broker: Broker,
    pub(crate) originator: Originator,
    pub(crate) name: String,
    pub(crate) default: T,
    pub(crate) mutability: Mutability,
    pub(crate) documentation: String,
    pub(crate) top_level: bool,
}

impl<T: ParamValue> ParamBuilder<T> {
    pub fn with_mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = doc.into();
        self
    }

    /// Use the name as given instead of prefixing it with the originator's
    /// hierarchy path.
    pub fn top_level(mut self) -> Self {
        self.top_level = true;
        self
    }

    fn full_name(&self) -> String {
        if self.top_level {
            self.name.clone()
        } else {
            name::join(self.originator.scope(), &self.name)
        }
    }
}

impl<T: ParamValue> Builder for ParamBuilder<T> {
    type Output = Param<T>;

    #[tracing::instrument(name = "param_build", skip(self), fields(
        name = %self.name,
        originator = %self.originator,
        full_name = tracing::field::Empty
    ))]
    fn build(self) -> Result<Param<T>> {
        if self.name.is_empty() {
            return Err(Error::EmptyName);
        }
        let full_name = self.full_name();
        tracing::Span::current().record("full_name", full_name.as_str());

        let mut value: Box<dyn ErasedValue> = Box::new(TypedValue(self.default));
        let mut explicit = false;
        if let Some(text) = self.broker.consume_init_value(&full_name) {
            match value::decode_like(value.as_ref(), &text) {
                Ok(init) => {
                    value = init;
                    explicit = true;
                    debug!("[PAR] '{}' takes init value {}", full_name, text);
                }
                Err(e) => warn!(
                    "[PAR] Ignoring init value {} for '{}': {}",
                    text, full_name, e
                ),
            }
        }

        let inner = Arc::new(ParamInner {
            name: full_name,
            originator: self.originator,
            mutability: self.mutability,
            broker: self.broker.clone(),
            state: Mutex::new(ParamState {
                value,
                lock: LockState::Unlocked,
                documentation: self.documentation,
                explicit,
                used: false,
                invalid: false,
            }),
            adapters: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });

        self.broker.add_param(&inner)?;

        Ok(Param {
            handle: ParamHandle { inner },
            _marker: PhantomData,
        })
    }
}
