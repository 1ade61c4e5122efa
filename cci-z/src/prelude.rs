//! Convenience re-exports for common cci-z types.
//!
//! Import everything with `use cci_z::prelude::*;`.

/// Required to call `.build()` on any builder type.
pub use crate::Builder;

pub use crate::broker::{Broker, BrokerSetError, WeakBroker};
pub use crate::callback::{
    CallbackEvent, CallbackHandle, CallbackReturn, CallbackType, ObserverId,
};
pub use crate::config::BrokerBuilder;
pub use crate::error::{AccessError, Error, Result};
pub use crate::event::{ParamEvent, ParamEventKind};
pub use crate::lifecycle::{Lifecycle, Phase};
pub use crate::originator::Originator;
pub use crate::param::{LockToken, Mutability, Param, ParamBuilder, ParamHandle};
pub use crate::resolver::BrokerResolver;
pub use crate::value::ParamValue;
