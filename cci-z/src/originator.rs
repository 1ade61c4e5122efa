//! Calling-context identification.
//!
//! Every registry operation is made on behalf of an [`Originator`]: either a
//! position in the surrounding component hierarchy (an object path such as
//! `top.cpu0`), a free-standing name (a tool or testbench), or both. The
//! object path decides which broker services the call and supplies the
//! prefix for parameter names declared in that context.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::name;

/// Name reported for an originator that has lost its context (root parent).
pub const UNKNOWN_ORIGINATOR: &str = "__CCI_UNKNOWN_ORIGINATOR__";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Originator {
    object: Option<String>,
    name: Option<String>,
}

impl Originator {
    /// Build an originator from an optional hierarchy path and an optional name.
    ///
    /// At least one of the two must be present and non-empty.
    pub fn new(object: Option<&str>, name: Option<&str>) -> Result<Self> {
        let object = object.filter(|o| !o.is_empty()).map(str::to_owned);
        let name = name.filter(|n| !n.is_empty()).map(str::to_owned);
        if object.is_none() && name.is_none() {
            return Err(Error::MissingOriginator);
        }
        Ok(Self { object, name })
    }

    /// Originator for an object of the component hierarchy.
    pub fn from_object(path: impl AsRef<str>) -> Result<Self> {
        Self::new(Some(path.as_ref()), None)
    }

    /// Originator for a tool or testbench outside the hierarchy.
    pub fn from_name(name: impl AsRef<str>) -> Result<Self> {
        Self::new(None, Some(name.as_ref()))
    }

    /// The sentinel returned when walking above the hierarchy root.
    pub fn unknown() -> Self {
        Self {
            object: None,
            name: Some(UNKNOWN_ORIGINATOR.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.object.is_none() && self.name.as_deref() == Some(UNKNOWN_ORIGINATOR)
    }

    /// Hierarchy path of the calling object, if any.
    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    /// The explicitly given name, if any.
    pub fn string_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Display name: object path first, then the explicit name.
    pub fn name(&self) -> &str {
        self.object
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(UNKNOWN_ORIGINATOR)
    }

    /// Walk one level up the surrounding hierarchy.
    ///
    /// Returns [`Originator::unknown`] for top-level objects and for
    /// originators that only carry a name.
    pub fn get_parent(&self) -> Self {
        match self.object.as_deref().and_then(name::parent) {
            Some(parent) => Self {
                object: Some(parent.to_string()),
                name: None,
            },
            None => Self::unknown(),
        }
    }

    /// Prefix for parameter names declared by this originator.
    pub(crate) fn scope(&self) -> &str {
        self.object.as_deref().unwrap_or("")
    }
}

impl PartialOrd for Originator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Originator {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name()
            .cmp(other.name())
            .then_with(|| self.object.cmp(&other.object))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for Originator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
