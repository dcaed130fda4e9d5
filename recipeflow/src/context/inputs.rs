//! Stage inputs restricted to declared keys.

use crate::errors::{StageFailure, UndeclaredInputError};
use std::collections::HashMap;

/// An immutable view of the run context holding only a stage's declared inputs.
///
/// Reading any other key fails with `UndeclaredInputError`; the stage never
/// sees ambient state.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    /// The name of the current stage (for error messages).
    stage_name: String,
    /// The visible values.
    values: HashMap<String, serde_json::Value>,
}

impl StageInputs {
    /// Creates new stage inputs.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            stage_name: stage_name.into(),
            values,
        }
    }

    /// Returns the name of the stage these inputs belong to.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Gets a value.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredInputError` if the key is not visible to the stage.
    pub fn get(&self, key: &str) -> Result<&serde_json::Value, UndeclaredInputError> {
        self.values
            .get(key)
            .ok_or_else(|| UndeclaredInputError::new(&self.stage_name, key))
    }

    /// Gets a string value.
    ///
    /// # Errors
    ///
    /// Fails if the key is not visible or the value is not a string.
    pub fn get_str(&self, key: &str) -> Result<&str, StageFailure> {
        self.get(key)?
            .as_str()
            .ok_or_else(|| StageFailure::invalid_input(key, "expected a string"))
    }

    /// Gets a list of strings.
    ///
    /// A bare string is accepted as a one-element list.
    ///
    /// # Errors
    ///
    /// Fails if the key is not visible or the value is not a string list.
    pub fn get_string_list(&self, key: &str) -> Result<Vec<String>, StageFailure> {
        match self.get(key)? {
            serde_json::Value::String(s) => Ok(vec![s.clone()]),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(ToString::to_string)
                        .ok_or_else(|| StageFailure::invalid_input(key, "expected a list of strings"))
                })
                .collect(),
            _ => Err(StageFailure::invalid_input(key, "expected a list of strings")),
        }
    }

    /// Gets a nested mapping.
    ///
    /// # Errors
    ///
    /// Fails if the key is not visible or the value is not an object.
    pub fn get_object(
        &self,
        key: &str,
    ) -> Result<&serde_json::Map<String, serde_json::Value>, StageFailure> {
        self.get(key)?
            .as_object()
            .ok_or_else(|| StageFailure::invalid_input(key, "expected a mapping"))
    }

    /// Checks if a key is visible.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the visible keys.
    #[must_use]
    pub fn keys(&self) -> Vec<&String> {
        self.values.keys().collect()
    }

    /// Returns the number of visible keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no key is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_inputs() -> StageInputs {
        let mut values = HashMap::new();
        values.insert("cuisine".to_string(), json!("Italian"));
        values.insert("ids".to_string(), json!(["r1", "r2"]));
        values.insert("prefs".to_string(), json!({"servings": 4}));
        values.insert("count".to_string(), json!(3));
        StageInputs::new("current", values)
    }

    #[test]
    fn test_declared_access() {
        let inputs = sample_inputs();

        assert_eq!(inputs.get_str("cuisine").unwrap(), "Italian");
        assert_eq!(inputs.get_string_list("ids").unwrap(), vec!["r1", "r2"]);
        assert_eq!(inputs.get_object("prefs").unwrap().get("servings"), Some(&json!(4)));
    }

    #[test]
    fn test_undeclared_access_fails() {
        let inputs = sample_inputs();

        let err = inputs.get("secret").unwrap_err();
        assert_eq!(err.stage, "current");
        assert_eq!(err.key, "secret");
        assert!(matches!(
            inputs.get_str("secret"),
            Err(StageFailure::UndeclaredInput(_))
        ));
    }

    #[test]
    fn test_type_mismatch_is_invalid_input() {
        let inputs = sample_inputs();

        assert!(matches!(
            inputs.get_str("ids"),
            Err(StageFailure::InvalidInput { .. })
        ));
        assert!(matches!(
            inputs.get_string_list("count"),
            Err(StageFailure::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_string_promoted_to_list() {
        let inputs = sample_inputs();
        assert_eq!(inputs.get_string_list("cuisine").unwrap(), vec!["Italian"]);
    }
}
