use std::cell::RefCell;
use std::collections::BTreeSet;

use geojson::JsonObject;
use serde_json::Value;
use tracing::warn;

use crate::error::{ObiaError, Result};

/// Typed access to user-supplied hyper-parameters. Keys that are never
/// read are reported by [`Params::warn_unused`].
pub(crate) struct Params<'a> {
    map: &'a JsonObject,
    read: RefCell<BTreeSet<&'a str>>,
}

impl<'a> Params<'a> {
    pub fn new(map: &'a JsonObject) -> Self {
        Self { map, read: RefCell::new(BTreeSet::new()) }
    }

    fn raw(&self, key: &'a str) -> Option<&'a Value> {
        self.read.borrow_mut().insert(key);
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn invalid(key: &str, want: &str, got: &Value) -> ObiaError {
        ObiaError::InvalidInput(format!("parameter '{key}' must be {want}, got {got}"))
    }

    pub fn f64_or(&self, key: &'a str, default: f64) -> Result<f64> {
        match self.raw(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| Self::invalid(key, "a number", v)),
        }
    }

    pub fn usize_or(&self, key: &'a str, default: usize) -> Result<usize> {
        Ok(self.opt_usize(key)?.unwrap_or(default))
    }

    /// `null` or absent maps to `None`.
    pub fn opt_usize(&self, key: &'a str) -> Result<Option<usize>> {
        match self.raw(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| Self::invalid(key, "a non-negative integer", v)),
        }
    }

    pub fn opt_u64(&self, key: &'a str) -> Result<Option<u64>> {
        match self.raw(key) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| Self::invalid(key, "a non-negative integer", v)),
        }
    }

    pub fn bool_or(&self, key: &'a str, default: bool) -> Result<bool> {
        match self.raw(key) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| Self::invalid(key, "a boolean", v)),
        }
    }

    /// Present, possibly as `null`.
    pub fn has_key(&self, key: &'a str) -> bool {
        self.read.borrow_mut().insert(key);
        self.map.contains_key(key)
    }

    pub fn value(&self, key: &'a str) -> Option<&'a Value> {
        self.raw(key)
    }

    pub fn str_or(&self, key: &'a str, default: &'a str) -> Result<&'a str> {
        match self.raw(key) {
            None => Ok(default),
            Some(v) => v.as_str().ok_or_else(|| Self::invalid(key, "a string", v)),
        }
    }

    pub fn warn_unused(&self) {
        let read = self.read.borrow();
        for key in self.map.keys().filter(|k| !read.contains(k.as_str())) {
            warn!(parameter = %key, "ignoring unknown classifier parameter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> JsonObject {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn typed_reads() {
        let m = obj(json!({"n": 3, "c": 0.5, "flag": true, "kind": "rbf", "none": null}));
        let p = Params::new(&m);
        assert_eq!(p.usize_or("n", 1).unwrap(), 3);
        assert_eq!(p.f64_or("c", 1.0).unwrap(), 0.5);
        assert!(p.bool_or("flag", false).unwrap());
        assert_eq!(p.str_or("kind", "linear").unwrap(), "rbf");
        assert_eq!(p.opt_usize("none").unwrap(), None);
        assert_eq!(p.usize_or("missing", 9).unwrap(), 9);
    }

    #[test]
    fn wrong_type_is_error() {
        let m = obj(json!({"n": "many"}));
        assert!(Params::new(&m).usize_or("n", 1).is_err());
    }
}
