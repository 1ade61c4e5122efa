//! Originator → broker resolution.
//!
//! A [`BrokerResolver`] is passed explicitly to every component. It keeps a
//! default broker plus any number of private brokers, each registered for a
//! subtree of the component hierarchy. Resolution walks from the calling
//! object up to the root and picks the first registered subtree; anything
//! unmatched goes to the default broker.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::Builder;
use crate::broker::Broker;
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::originator::Originator;
use crate::param::ParamBuilder;
use crate::value::ParamValue;

pub const DEFAULT_BROKER_NAME: &str = "DEFAULT_BROKER";

struct ResolverInner {
    default_broker: Broker,
    lifecycle: Lifecycle,
    contexts: Mutex<HashMap<String, Broker>>,
}

#[derive(Clone)]
pub struct BrokerResolver {
    inner: Arc<ResolverInner>,
}

impl BrokerResolver {
    /// Resolver with a fresh default broker.
    pub fn new() -> Self {
        Self::with_default(Broker::new(DEFAULT_BROKER_NAME))
    }

    pub fn builder() -> BrokerResolverBuilder {
        BrokerResolverBuilder::default()
    }

    /// Resolver around an existing default broker. Private brokers created
    /// through [`new_private_broker`](Self::new_private_broker) share its
    /// elaboration boundary.
    pub fn with_default(default_broker: Broker) -> Self {
        let lifecycle = default_broker.lifecycle().clone();
        Self {
            inner: Arc::new(ResolverInner {
                default_broker,
                lifecycle,
                contexts: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn default_broker(&self) -> &Broker {
        &self.inner.default_broker
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    /// Make `broker` responsible for `context` and everything below it.
    ///
    /// A context is keyed by its object path, or by its name for originators
    /// outside the hierarchy. Fails if the broker currently serving the
    /// context already holds parameters under it: they would become
    /// unreachable through resolution.
    pub fn register_broker(&self, context: &Originator, broker: Broker) -> Result<()> {
        let key = context.name().to_string();
        let current = self.resolve(context);
        let in_use = current.exists_param(&key)
            || !current.get_param_list(&format!("{key}.*")).is_empty();
        if in_use {
            return Err(Error::ContextInUse {
                context: key,
                broker: current.name().to_string(),
            });
        }
        let mut contexts = self.inner.contexts.lock();
        if contexts.contains_key(&key) {
            return Err(Error::ContextTaken(key));
        }
        info!("[RSV] Broker '{}' serves '{}'", broker.name(), key);
        contexts.insert(key, broker);
        Ok(())
    }

    /// Create and register a private broker for `context`.
    ///
    /// Call this before any component below `context` declares parameters.
    pub fn new_private_broker(&self, context: &Originator) -> Result<Broker> {
        let broker = Broker::builder(format!("{}.broker", context.name()))
            .with_lifecycle(self.inner.lifecycle.clone())
            .build()?;
        self.register_broker(context, broker.clone())?;
        Ok(broker)
    }

    /// Broker responsible for `originator`.
    pub fn resolve(&self, originator: &Originator) -> Broker {
        let contexts = self.inner.contexts.lock();
        if !contexts.is_empty() {
            let mut current = originator.clone();
            while !current.is_unknown() {
                if let Some(broker) = contexts.get(current.name()) {
                    debug!("[RSV] '{}' -> '{}'", originator, broker.name());
                    return broker.clone();
                }
                current = current.get_parent();
            }
            // Originators with both an object and a name may be registered by name
            if let Some(broker) = originator.string_name().and_then(|n| contexts.get(n)) {
                return broker.clone();
            }
        }
        self.inner.default_broker.clone()
    }

    /// Declare a parameter in the broker responsible for `originator`.
    pub fn create_param<T: ParamValue>(
        &self,
        originator: &Originator,
        name: impl Into<String>,
        default: T,
    ) -> ParamBuilder<T> {
        self.resolve(originator).create_param(originator, name, default)
    }
}

impl Default for BrokerResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BrokerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut contexts: Vec<String> = self.inner.contexts.lock().keys().cloned().collect();
        contexts.sort();
        f.debug_struct("BrokerResolver")
            .field("default_broker", &self.inner.default_broker.name())
            .field("contexts", &contexts)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct BrokerResolverBuilder {
    default_broker: Option<Broker>,
    lifecycle: Option<Lifecycle>,
    init_values: Vec<(String, String)>,
    use_env: bool,
}

impl BrokerResolverBuilder {
    /// Use an existing broker as the default. Its lifecycle wins over
    /// [`with_lifecycle`](Self::with_lifecycle) and init values given here
    /// are ignored.
    pub fn with_default_broker(mut self, broker: Broker) -> Self {
        self.default_broker = Some(broker);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Init value for the default broker.
    pub fn with_init_value(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.init_values.push((name.into(), text.into()));
        self
    }

    /// Read default-broker init values from the environment.
    pub fn with_env_init_values(mut self) -> Self {
        self.use_env = true;
        self
    }
}

impl Builder for BrokerResolverBuilder {
    type Output = BrokerResolver;

    fn build(self) -> Result<BrokerResolver> {
        let broker = match self.default_broker {
            Some(broker) => broker,
            None => {
                let mut builder = Broker::builder(DEFAULT_BROKER_NAME)
                    .with_lifecycle(self.lifecycle.unwrap_or_default())
                    .with_init_values(self.init_values);
                if self.use_env {
                    builder = builder.with_env_init_values();
                }
                builder.build()?
            }
        };
        Ok(BrokerResolver::with_default(broker))
    }
}
