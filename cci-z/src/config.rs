//! Broker configuration.
//!
//! Init values can be given programmatically or through the environment:
//!
//! ```bash
//! export CCIZ_INIT_VALUES='top.cpu.freq=100;top.mem.size=4096;top.name="cpu0"'
//! ```
//!
//! Each pair is `name=value` where `value` is canonical (JSON) text.

use tracing::debug;

use crate::Builder;
use crate::broker::Broker;
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;

pub const INIT_VALUES_ENV: &str = "CCIZ_INIT_VALUES";

/// Builder for a [`Broker`].
#[derive(Debug, Default)]
pub struct BrokerBuilder {
    name: String,
    lifecycle: Option<Lifecycle>,
    init_values: Vec<(String, String)>,
    use_env: bool,
}

impl BrokerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Share an elaboration boundary with other brokers.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_init_value(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.init_values.push((name.into(), text.into()));
        self
    }

    pub fn with_init_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.init_values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Also read init values from `CCIZ_INIT_VALUES` at build time.
    ///
    /// Environment values are applied after programmatic ones and win on
    /// conflict.
    pub fn with_env_init_values(mut self) -> Self {
        self.use_env = true;
        self
    }
}

impl Builder for BrokerBuilder {
    type Output = Broker;

    #[tracing::instrument(name = "broker_build", skip(self), fields(name = %self.name))]
    fn build(self) -> Result<Broker> {
        let mut init_values = self.init_values;
        if self.use_env {
            if let Ok(text) = std::env::var(INIT_VALUES_ENV) {
                debug!("[CFG] Applying init values from {}: {}", INIT_VALUES_ENV, text);
                init_values.extend(parse_init_values(&text)?);
            }
        }

        let broker = Broker::from_parts(self.name, self.lifecycle.unwrap_or_default());
        for (name, text) in &init_values {
            broker.set_init_value(name, text)?;
        }
        Ok(broker)
    }
}

/// Parse `name=value;name=value` pairs. Empty pairs are skipped; values must
/// be valid JSON.
pub fn parse_init_values(text: &str) -> Result<Vec<(String, String)>> {
    let mut values = Vec::new();
    for pair in text.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((name, value)) = pair.split_once('=') else {
            return Err(Error::InvalidOverride(pair.to_string()));
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() {
            return Err(Error::InvalidOverride(pair.to_string()));
        }
        serde_json::from_str::<serde_json::Value>(value).map_err(|e| Error::InvalidInitValue {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        debug!("[CFG] Init value: {} = {}", name, value);
        values.push((name.to_string(), value.to_string()));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let values = parse_init_values(r#" a.b=1; c="x=y" ;;d=[1,2]"#).unwrap();
        assert_eq!(
            values,
            [
                ("a.b".to_string(), "1".to_string()),
                ("c".to_string(), "\"x=y\"".to_string()),
                ("d".to_string(), "[1,2]".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_init_values("a.b"),
            Err(Error::InvalidOverride("a.b".into()))
        );
        assert_eq!(
            parse_init_values("=1"),
            Err(Error::InvalidOverride("=1".into()))
        );
        assert!(matches!(
            parse_init_values("a=not json"),
            Err(Error::InvalidInitValue { name, .. }) if name == "a"
        ));
    }

    #[test]
    fn test_builder_applies_init_values() {
        let lifecycle = Lifecycle::new();
        let broker = BrokerBuilder::new("configured")
            .with_lifecycle(lifecycle.clone())
            .with_init_value("x", "1")
            .with_init_values([("y", "true"), ("z", "\"s\"")])
            .build()
            .unwrap();
        assert_eq!(broker.name(), "configured");
        assert!(broker.lifecycle().same_as(&lifecycle));
        assert_eq!(broker.unconsumed_init_values().len(), 3);
    }

    #[test]
    fn test_builder_rejects_bad_value() {
        let err = BrokerBuilder::new("b")
            .with_init_value("x", "{")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInitValue { .. }));
    }
}
