//! Registry change notifications delivered through [`Broker::subscribe`](crate::Broker::subscribe).

use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParamEventKind {
    Created,
    Changed,
    Destroyed,
}

/// One change in a broker.
///
/// `value` carries the canonical text of the value after the change and is
/// absent for `Destroyed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamEvent {
    pub kind: ParamEventKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ParamEvent {
    pub(crate) fn new(kind: ParamEventKind, name: &str, value: Option<String>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            value,
        }
    }
}
