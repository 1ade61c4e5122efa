//! # cci-z: hierarchical configuration parameters
//!
//! `cci-z` is a registry of named, typed, runtime-mutable parameters for
//! component-based simulators. Components declare parameters under their
//! hierarchy path; tools and other components find them by name, read and
//! write them through canonical (JSON) text, lock them, and observe them
//! through callbacks.
//!
//! ## Getting started
//!
//! ```rust
//! use cci_z::prelude::*;
//!
//! let resolver = BrokerResolver::new();
//! let cpu = Originator::from_object("top.cpu")?;
//!
//! let freq = resolver
//!     .create_param(&cpu, "freq_mhz", 100_u32)
//!     .with_documentation("Core clock")
//!     .build()?;
//!
//! // A configuration tool working only with names
//! let broker = resolver.resolve(&Originator::from_name("tool")?);
//! let handle = broker.get_param("top.cpu.freq_mhz").unwrap();
//! handle.set_string("250").unwrap();
//!
//! assert_eq!(freq.get(), 250);
//! assert_eq!(broker.get_param_list("top.*"), ["top.cpu.freq_mhz"]);
//! # Ok::<(), cci_z::Error>(())
//! ```
//!
//! ## Brokers
//!
//! Every operation runs against a [`Broker`] handle passed in explicitly.
//! A [`BrokerResolver`] maps calling contexts ([`Originator`]s) to brokers so
//! that a subtree of the hierarchy can keep its parameters private.
//!
//! ## Errors
//!
//! Structural problems (duplicate names, alias collisions, ...) are reported
//! as [`Error`]. Every read, write, lock and unlock reports its failures as
//! [`AccessError`], which callers are expected to inspect and recover from.

pub mod broker;
pub mod callback;
pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod name;
pub mod originator;
pub mod param;
pub mod prelude;
pub mod resolver;
pub mod value;

use std::sync::atomic::AtomicUsize;

pub use broker::Broker;
pub use error::{AccessError, Error, Result};
pub use originator::Originator;
pub use param::{Param, ParamHandle};
pub use resolver::BrokerResolver;

/// Process-wide id source.
pub(crate) struct GlobalCounter(AtomicUsize);

impl GlobalCounter {
    pub(crate) const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub(crate) fn increment(&self) -> usize {
        self.0.fetch_add(1, std::sync::atomic::Ordering::AcqRel)
    }
}

/// Builds a configured object, consuming the builder.
///
/// Bring it into scope (or use the prelude) to call `.build()`.
pub trait Builder {
    /// The type produced by this builder.
    type Output;
    /// Consume the builder and construct the configured object.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, e.g. a parameter
    /// name is already taken or an init value is not valid JSON.
    fn build(self) -> Result<Self::Output>;
}
