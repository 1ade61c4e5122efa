//! Callback adapters and dispatch.
//!
//! An adapter binds an observer, a [`CallbackType`] and a target: either one
//! parameter, or a broker together with a name pattern. The target owns the
//! adapter (strong reference); the adapter only keeps a weak back-reference,
//! which is cut when the target goes away so that a late
//! [`CallbackHandle::unregister`] is a no-op instead of touching a dead
//! parameter.
//!
//! All adapters draw their sequence number from one process-wide counter, so
//! merging parameter-level and broker-level adapters by sequence number
//! reproduces registration order.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::GlobalCounter;
use crate::broker::BrokerInner;
use crate::param::{ParamHandle, ParamInner};
use crate::value::{ErasedValue, ParamValue};

static ADAPTER_SEQ: GlobalCounter = GlobalCounter::new();
static OBSERVER_IDS: GlobalCounter = GlobalCounter::new();

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::AsRefStr,
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum CallbackType {
    /// Before the value is read.
    PreRead,
    /// Before the value is written; may veto the write.
    PreWrite,
    /// After the value has been written.
    PostWrite,
    /// A parameter was added to the broker.
    CreateParam,
    /// A parameter is about to be removed from the broker.
    DestroyParam,
}

impl CallbackType {
    /// Broker-level events concern a parameter's existence, not its value.
    pub fn is_broker_event(self) -> bool {
        matches!(self, Self::CreateParam | Self::DestroyParam)
    }
}

/// What a callback reports back to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackReturn {
    #[default]
    Nothing,
    /// Veto the value change. Only meaningful for `pre_write`.
    ValueChangeRejected,
    OtherError,
}

/// Identity of whoever registered a callback.
///
/// Used to unregister every callback of one observer without knowing where
/// they were registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(usize);

impl ObserverId {
    pub fn new() -> Self {
        Self(OBSERVER_IDS.increment())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Everything a callback gets to see about the event.
pub struct CallbackEvent<'a> {
    param: &'a ParamHandle,
    callback_type: CallbackType,
    proposed: Option<&'a dyn ErasedValue>,
}

impl<'a> CallbackEvent<'a> {
    pub(crate) fn new(
        param: &'a ParamHandle,
        callback_type: CallbackType,
        proposed: Option<&'a dyn ErasedValue>,
    ) -> Self {
        Self {
            param,
            callback_type,
            proposed,
        }
    }

    pub fn param(&self) -> &ParamHandle {
        self.param
    }

    pub fn callback_type(&self) -> CallbackType {
        self.callback_type
    }

    /// Value about to be written (`pre_write` only).
    pub fn proposed_as<T: ParamValue>(&self) -> Option<&T> {
        self.proposed.and_then(|v| v.try_as::<T>())
    }

    /// Canonical text of the value about to be written (`pre_write` only).
    pub fn proposed_string(&self) -> Option<String> {
        self.proposed.and_then(|v| v.pack().ok())
    }
}

impl fmt::Debug for CallbackEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackEvent")
            .field("param", &self.param.name())
            .field("callback_type", &self.callback_type)
            .field("proposed", &self.proposed)
            .finish()
    }
}

pub type CallbackFn = Arc<dyn Fn(&CallbackEvent<'_>) -> CallbackReturn + Send + Sync>;

pub(crate) enum AdapterTarget {
    Param(Weak<ParamInner>),
    Broker(Weak<BrokerInner>),
    Detached,
}

pub(crate) struct CallbackAdapter {
    seq: usize,
    observer: ObserverId,
    callback_type: CallbackType,
    pattern: String,
    target: Mutex<AdapterTarget>,
    func: CallbackFn,
}

impl CallbackAdapter {
    pub(crate) fn new(
        observer: ObserverId,
        callback_type: CallbackType,
        pattern: String,
        target: AdapterTarget,
        func: CallbackFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            seq: ADAPTER_SEQ.increment(),
            observer,
            callback_type,
            pattern,
            target: Mutex::new(target),
            func,
        })
    }

    pub(crate) fn seq(&self) -> usize {
        self.seq
    }

    pub(crate) fn observer(&self) -> ObserverId {
        self.observer
    }

    pub(crate) fn callback_type(&self) -> CallbackType {
        self.callback_type
    }

    pub(crate) fn pattern(&self) -> &str {
        &self.pattern
    }

    pub(crate) fn is_registered(&self) -> bool {
        !matches!(*self.target.lock(), AdapterTarget::Detached)
    }

    /// Cut the back-reference without notifying the target.
    ///
    /// Called by the target itself while it drops its adapter list.
    pub(crate) fn detach(&self) {
        *self.target.lock() = AdapterTarget::Detached;
    }

    /// Remove this adapter from its target. Returns `false` if it was already
    /// unregistered or the target is gone.
    pub(crate) fn unregister(&self) -> bool {
        let target = std::mem::replace(&mut *self.target.lock(), AdapterTarget::Detached);
        match target {
            AdapterTarget::Param(param) => param
                .upgrade()
                .is_some_and(|p| p.remove_adapter(self.seq)),
            AdapterTarget::Broker(broker) => broker
                .upgrade()
                .is_some_and(|b| b.remove_adapter(self.seq)),
            AdapterTarget::Detached => false,
        }
    }

    fn call(&self, event: &CallbackEvent<'_>) -> CallbackReturn {
        (self.func)(event)
    }
}

impl fmt::Debug for CallbackAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAdapter")
            .field("seq", &self.seq)
            .field("observer", &self.observer)
            .field("callback_type", &self.callback_type)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Registration receipt handed back to whoever registered a callback.
#[derive(Debug, Clone)]
pub struct CallbackHandle(Arc<CallbackAdapter>);

impl CallbackHandle {
    pub(crate) fn new(adapter: Arc<CallbackAdapter>) -> Self {
        Self(adapter)
    }

    pub fn observer(&self) -> ObserverId {
        self.0.observer
    }

    pub fn callback_type(&self) -> CallbackType {
        self.0.callback_type
    }

    /// Parameter name or name pattern this callback is bound to.
    pub fn pattern(&self) -> &str {
        &self.0.pattern
    }

    pub fn is_registered(&self) -> bool {
        self.0.is_registered()
    }

    /// Unregister the callback. Idempotent; only the first call has an effect.
    pub fn unregister(&self) -> bool {
        self.0.unregister()
    }

    pub(crate) fn seq(&self) -> usize {
        self.0.seq
    }
}

/// Outcome of one dispatch round.
#[derive(Debug, Default)]
pub(crate) struct DispatchOutcome {
    pub(crate) rejected_by: Vec<ObserverId>,
}

/// Run `adapters` in order for one event.
///
/// `adapters` is a snapshot taken without holding any lock, so callbacks may
/// freely re-enter the broker or the parameter. Adapters unregistered by an
/// earlier callback of the same round are skipped.
pub(crate) fn dispatch(
    adapters: &[Arc<CallbackAdapter>],
    event: &CallbackEvent<'_>,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    for adapter in adapters {
        if !adapter.is_registered() {
            continue;
        }
        match adapter.call(event) {
            CallbackReturn::Nothing => {}
            CallbackReturn::ValueChangeRejected => {
                if event.callback_type() == CallbackType::PreWrite {
                    debug!(
                        "[CB] {} rejected write to '{}'",
                        adapter.observer,
                        event.param().name()
                    );
                    outcome.rejected_by.push(adapter.observer);
                } else {
                    warn!(
                        "[CB] {} returned a rejection from a {} callback on '{}', ignored",
                        adapter.observer,
                        event.callback_type(),
                        event.param().name()
                    );
                }
            }
            CallbackReturn::OtherError => {
                warn!(
                    "[CB] {} reported an error from a {} callback on '{}'",
                    adapter.observer,
                    event.callback_type(),
                    event.param().name()
                );
            }
        }
    }
    outcome
}

/// Merge two adapter lists into registration order.
pub(crate) fn merge_by_seq(
    mut a: Vec<Arc<CallbackAdapter>>,
    b: Vec<Arc<CallbackAdapter>>,
) -> Vec<Arc<CallbackAdapter>> {
    a.extend(b);
    a.sort_by_key(|adapter| adapter.seq);
    a
}
