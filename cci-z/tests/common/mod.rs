use std::sync::{Arc, Once};

use cci_z::prelude::*;
use parking_lot::Mutex;

static TRACING: Once = Once::new();

/// Install a fmt subscriber honouring `RUST_LOG`, once per test binary.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A fresh broker plus an originator inside the hierarchy.
#[allow(dead_code)]
pub fn broker_with_owner(owner: &str) -> (Broker, Originator) {
    init_tracing();
    (
        Broker::new(format!("{owner}_broker")),
        Originator::from_object(owner).expect("originator"),
    )
}

/// Shared log of callback invocations, in order.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Callback recording `<tag>:<callback type>:<param name>` and returning `ret`.
    pub fn recorder(
        &self,
        tag: &'static str,
        ret: CallbackReturn,
    ) -> impl Fn(&CallbackEvent<'_>) -> CallbackReturn + Send + Sync + 'static {
        let log = self.clone();
        move |event| {
            log.push(format!(
                "{}:{}:{}",
                tag,
                event.callback_type(),
                event.param().name()
            ));
            ret
        }
    }
}
