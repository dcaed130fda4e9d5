//! The run context accumulated across stages.

use super::{StageData, StageInputs};
use crate::errors::DataConflictError;
use std::collections::HashMap;

/// Key-value state for one pipeline run.
///
/// The context only grows: writing to an existing key raises a
/// `DataConflictError`. Keys are remembered in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    data: HashMap<String, serde_json::Value>,
    order: Vec<String>,
}

impl RunContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with `data`.
    ///
    /// Seed keys are inserted in sorted order so the key listing is stable.
    #[must_use]
    pub fn from_seed(data: StageData) -> Self {
        let mut entries: Vec<_> = data.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut ctx = Self::new();
        for (key, value) in entries {
            ctx.order.push(key.clone());
            ctx.data.insert(key, value);
        }
        ctx
    }

    /// Gets a value from the context.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Gets a string value from the context.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Inserts a new key.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the key already exists.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), DataConflictError> {
        let key = key.into();
        if self.data.contains_key(&key) {
            return Err(DataConflictError::new(key));
        }

        self.order.push(key.clone());
        self.data.insert(key, value);
        Ok(())
    }

    /// Merges a stage output into the context.
    ///
    /// Either every key is inserted or none is. `order` fixes the insertion
    /// order of the merged keys; keys of `data` missing from `order` are
    /// appended in sorted order.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` for the first key that already exists.
    pub fn merge(&mut self, mut data: StageData, order: &[String]) -> Result<(), DataConflictError> {
        if let Some(key) = order
            .iter()
            .filter(|k| data.contains_key(*k))
            .chain(data.keys())
            .find(|k| self.data.contains_key(*k))
        {
            return Err(DataConflictError::new(key.clone()));
        }

        for key in order {
            if let Some(value) = data.remove(key) {
                self.order.push(key.clone());
                self.data.insert(key.clone(), value);
            }
        }

        let mut rest: Vec<_> = data.into_iter().collect();
        rest.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in rest {
            self.order.push(key.clone());
            self.data.insert(key, value);
        }

        Ok(())
    }

    /// Returns the keys from `required` that are absent, in the given order.
    #[must_use]
    pub fn missing_keys(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|k| !self.data.contains_key(*k))
            .cloned()
            .collect()
    }

    /// Builds the inputs for `stage`, containing exactly the `required` keys.
    ///
    /// Absent keys are left out; callers check [`Self::missing_keys`] first.
    #[must_use]
    pub fn slice(&self, stage: &str, required: &[String]) -> StageInputs {
        let values = required
            .iter()
            .filter_map(|k| self.data.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        StageInputs::new(stage, values)
    }

    /// Returns all keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> StageData {
        self.data.clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_insert_and_get() {
        let mut ctx = RunContext::new();
        ctx.insert("key", json!("value")).unwrap();

        assert_eq!(ctx.get("key"), Some(&json!("value")));
        assert_eq!(ctx.get_str("key"), Some("value"));
        assert!(ctx.contains_key("key"));
        assert!(!ctx.contains_key("other"));
    }

    #[test]
    fn test_insert_conflict() {
        let mut ctx = RunContext::new();
        ctx.insert("key", json!(1)).unwrap();

        let err = ctx.insert("key", json!(2)).unwrap_err();
        assert_eq!(err.key, "key");
        assert_eq!(ctx.get("key"), Some(&json!(1)));
    }

    #[test]
    fn test_seed_order_is_sorted() {
        let mut seed = StageData::new();
        seed.insert("b".to_string(), json!(2));
        seed.insert("a".to_string(), json!(1));

        let ctx = RunContext::from_seed(seed);
        assert_eq!(ctx.keys(), &keys(&["a", "b"])[..]);
    }

    #[test]
    fn test_merge_follows_declared_order() {
        let mut ctx = RunContext::new();
        let mut data = StageData::new();
        data.insert("z".to_string(), json!(1));
        data.insert("y".to_string(), json!(2));

        ctx.merge(data, &keys(&["z", "y"])).unwrap();
        assert_eq!(ctx.keys(), &keys(&["z", "y"])[..]);
    }

    #[test]
    fn test_merge_is_all_or_nothing() {
        let mut ctx = RunContext::new();
        ctx.insert("taken", json!("first")).unwrap();

        let mut data = StageData::new();
        data.insert("fresh".to_string(), json!(1));
        data.insert("taken".to_string(), json!("second"));

        let err = ctx.merge(data, &keys(&["fresh", "taken"])).unwrap_err();
        assert_eq!(err.key, "taken");
        assert!(!ctx.contains_key("fresh"));
        assert_eq!(ctx.get_str("taken"), Some("first"));
    }

    #[test]
    fn test_missing_keys_and_slice() {
        let mut ctx = RunContext::new();
        ctx.insert("a", json!(1)).unwrap();
        ctx.insert("b", json!(2)).unwrap();
        ctx.insert("c", json!(3)).unwrap();

        assert_eq!(ctx.missing_keys(&keys(&["a", "x", "y"])), keys(&["x", "y"]));

        let inputs = ctx.slice("stage", &keys(&["a", "c"]));
        assert_eq!(inputs.len(), 2);
        assert!(inputs.contains("a"));
        assert!(!inputs.contains("b"));
    }
}
