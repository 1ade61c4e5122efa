//! Parameter values and their canonical text form.
//!
//! Any serde-capable type can be stored in a parameter. The canonical text of
//! a value is its compact JSON encoding, so `unpack(pack(v)) == v` holds for
//! every type whose `Serialize`/`Deserialize` implementations agree.
//!
//! Non-finite floats have no JSON form: `pack` turns them into `null`, which
//! does not decode back. Parameters refuse such values on write with
//! [`AccessError::NotRepresentable`].
//!
//! ```rust
//! use cci_z::value::{pack, unpack};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Route {
//!     s_address: i32,
//!     d_address: i32,
//!     index: i32,
//! }
//!
//! let route = Route { s_address: 1, d_address: 2, index: 3 };
//! let text = pack(&route).unwrap();
//! assert_eq!(text, r#"{"s_address":1,"d_address":2,"index":3}"#);
//! assert_eq!(unpack::<Route>(&text).unwrap(), route);
//! ```

use std::any::Any;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AccessError;

/// Bound satisfied by every type that can live in a parameter.
pub trait ParamValue:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
}

impl<T> ParamValue for T where
    T: Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
}

/// Encode a value to its canonical text.
pub fn pack<T: Serialize>(value: &T) -> Result<String, AccessError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a value from canonical text.
pub fn unpack<T: DeserializeOwned>(text: &str) -> Result<T, AccessError> {
    Ok(serde_json::from_str(text)?)
}

/// Type-erased value holder. The concrete type is fixed when the holder is
/// created and never changes afterwards.
pub trait ErasedValue: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;

    fn pack(&self) -> Result<String, AccessError>;

    /// Canonical text, provided it decodes back to the held value.
    fn pack_checked(&self) -> Result<String, AccessError>;

    fn to_json(&self) -> Result<serde_json::Value, AccessError>;

    /// Replace the held value with one decoded from `text`.
    ///
    /// On failure the held value is left untouched.
    fn unpack_into(&mut self, text: &str) -> Result<(), AccessError>;

    /// Replace the held value with one converted from a JSON value.
    fn assign_json(&mut self, value: serde_json::Value) -> Result<(), AccessError>;

    /// Replace the held value with another holder of the same type.
    fn assign(&mut self, other: &dyn ErasedValue) -> Result<(), AccessError>;

    fn as_any(&self) -> &dyn Any;

    fn clone_box(&self) -> Box<dyn ErasedValue>;
}

impl<'a> dyn ErasedValue + 'a {
    /// Typed view of the held value; `None` when `T` is not the held type.
    pub fn try_as<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub(crate) fn try_get<T: ParamValue>(&self) -> Result<T, AccessError> {
        self.try_as::<T>()
            .cloned()
            .ok_or_else(|| AccessError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: self.type_name(),
            })
    }
}

impl Clone for Box<dyn ErasedValue> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TypedValue<T>(pub(crate) T);

impl<T: ParamValue> ErasedValue for TypedValue<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn pack(&self) -> Result<String, AccessError> {
        pack(&self.0)
    }

    fn pack_checked(&self) -> Result<String, AccessError> {
        let text = pack(&self.0)?;
        match unpack::<T>(&text) {
            Ok(back) if back == self.0 => Ok(text),
            _ => Err(AccessError::NotRepresentable {
                value: format!("{:?}", self.0),
            }),
        }
    }

    fn to_json(&self) -> Result<serde_json::Value, AccessError> {
        Ok(serde_json::to_value(&self.0)?)
    }

    fn unpack_into(&mut self, text: &str) -> Result<(), AccessError> {
        self.0 = unpack(text)?;
        Ok(())
    }

    fn assign_json(&mut self, value: serde_json::Value) -> Result<(), AccessError> {
        self.0 = serde_json::from_value(value)?;
        Ok(())
    }

    fn assign(&mut self, other: &dyn ErasedValue) -> Result<(), AccessError> {
        match other.as_any().downcast_ref::<T>() {
            Some(v) => {
                self.0 = v.clone();
                Ok(())
            }
            None => Err(AccessError::TypeMismatch {
                expected: self.type_name(),
                actual: other.type_name(),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn clone_box(&self) -> Box<dyn ErasedValue> {
        Box::new(self.clone())
    }
}

/// Decode `text` into a fresh holder of the same type as `like`.
///
/// Used to validate a proposed value before any observer sees it.
pub(crate) fn decode_like(
    like: &dyn ErasedValue,
    text: &str,
) -> Result<Box<dyn ErasedValue>, AccessError> {
    let mut fresh = like.clone_box();
    fresh.unpack_into(text)?;
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct RouteEntry {
        s_address: i32,
        d_address: i32,
        index: i32,
    }

    fn erased<T: ParamValue>(v: T) -> Box<dyn ErasedValue> {
        Box::new(TypedValue(v))
    }

    #[test]
    fn test_primitive_text() {
        assert_eq!(pack(&42_i64).unwrap(), "42");
        assert_eq!(pack(&true).unwrap(), "true");
        assert_eq!(pack(&"hi".to_string()).unwrap(), "\"hi\"");
        assert_eq!(unpack::<u32>("5000").unwrap(), 5000);
        assert_eq!(unpack::<f64>("2.5").unwrap(), 2.5);
    }

    #[test]
    fn test_round_trip_values() {
        let route = RouteEntry {
            s_address: 0x10,
            d_address: 0x20,
            index: 3,
        };
        assert_eq!(unpack::<RouteEntry>(&pack(&route).unwrap()).unwrap(), route);

        let list = vec![1_i32, -2, 3];
        assert_eq!(unpack::<Vec<i32>>(&pack(&list).unwrap()).unwrap(), list);

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1.5_f64);
        assert_eq!(
            unpack::<BTreeMap<String, f64>>(&pack(&map).unwrap()).unwrap(),
            map
        );

        let opt: Option<String> = None;
        assert_eq!(unpack::<Option<String>>(&pack(&opt).unwrap()).unwrap(), opt);
    }

    #[test]
    fn test_failed_unpack_keeps_value() {
        let mut v = erased(7_i32);
        assert!(v.unpack_into("not a number").is_err());
        assert_eq!(v.try_as::<i32>(), Some(&7));

        assert!(v.unpack_into("\"string\"").is_err());
        assert_eq!(v.try_as::<i32>(), Some(&7));

        v.unpack_into("9").unwrap();
        assert_eq!(v.try_as::<i32>(), Some(&9));
    }

    #[test]
    fn test_non_finite_has_no_text() {
        assert_eq!(pack(&f64::NAN).unwrap(), "null");
        assert!(matches!(
            erased(f64::NAN).pack_checked(),
            Err(AccessError::NotRepresentable { .. })
        ));
        assert!(erased(vec![1.0_f32, f32::INFINITY]).pack_checked().is_err());
        assert_eq!(erased(2.0_f64).pack_checked().unwrap(), "2.0");
    }

    #[test]
    fn test_try_as_mismatch() {
        let v = erased(1_u8);
        assert_eq!(v.try_as::<u16>(), None);
        let err = v.try_get::<String>().unwrap_err();
        assert!(matches!(err, AccessError::TypeMismatch { .. }));
    }

    #[test]
    fn test_assign_checks_type() {
        let mut v = erased(1_i32);
        v.assign(erased(2_i32).as_ref()).unwrap();
        assert_eq!(v.try_as::<i32>(), Some(&2));
        assert!(v.assign(erased(2_i64).as_ref()).is_err());
        assert_eq!(v.try_as::<i32>(), Some(&2));
    }

    #[test]
    fn test_json_access() {
        let mut v = erased(RouteEntry {
            s_address: 1,
            d_address: 2,
            index: 0,
        });
        let json = v.to_json().unwrap();
        assert_eq!(json["d_address"], 2);

        v.assign_json(serde_json::json!({"s_address": 5, "d_address": 6, "index": 7}))
            .unwrap();
        assert_eq!(v.try_as::<RouteEntry>().map(|r| r.index), Some(7));

        assert!(v.assign_json(serde_json::json!({"s_address": 5})).is_err());
        assert_eq!(v.try_as::<RouteEntry>().map(|r| r.index), Some(7));
    }
}
