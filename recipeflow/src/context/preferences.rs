//! The caller's recipe preferences.

use super::{keys, StageData};
use crate::errors::RunError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::num::NonZeroU32;

const DEFAULT_SERVINGS: u32 = 4;

/// Validated, immutable recipe preferences for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceSet {
    dietary_restrictions: BTreeSet<String>,
    preferred_cuisine: String,
    avoid_ingredients: BTreeSet<String>,
    required_ingredients: BTreeSet<String>,
    servings: NonZeroU32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dish_type: Option<String>,
}

impl PreferenceSet {
    /// Creates a preference set for a cuisine with no other constraints.
    #[must_use]
    pub fn new(preferred_cuisine: impl Into<String>) -> Self {
        Self {
            dietary_restrictions: BTreeSet::new(),
            preferred_cuisine: preferred_cuisine.into(),
            avoid_ingredients: BTreeSet::new(),
            required_ingredients: BTreeSet::new(),
            servings: NonZeroU32::new(DEFAULT_SERVINGS).unwrap_or(NonZeroU32::MIN),
            dish_type: None,
        }
    }

    /// Sets the dietary restriction tags.
    #[must_use]
    pub fn with_dietary_restrictions(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dietary_restrictions = normalize(tags);
        self
    }

    /// Sets the ingredients to avoid.
    #[must_use]
    pub fn with_avoid_ingredients(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.avoid_ingredients = normalize(items);
        self
    }

    /// Sets the ingredients that must be included.
    #[must_use]
    pub fn with_required_ingredients(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_ingredients = normalize(items);
        self
    }

    /// Sets the serving count.
    #[must_use]
    pub fn with_servings(mut self, servings: NonZeroU32) -> Self {
        self.servings = servings;
        self
    }

    /// Sets the dish type.
    #[must_use]
    pub fn with_dish_type(mut self, dish_type: impl Into<String>) -> Self {
        self.dish_type = Some(dish_type.into());
        self
    }

    /// Validates a raw caller mapping.
    ///
    /// `dietary_restrictions`, `preferred_cuisine`, `avoid_ingredients` and
    /// one of `ingredient_filters` / `required_ingredients` are mandatory.
    /// `dietary_restrictions` may be a comma-separated string or a list.
    ///
    /// # Errors
    ///
    /// Returns `RunError::InvalidPreferences` naming the first bad key.
    pub fn from_mapping(raw: &serde_json::Map<String, serde_json::Value>) -> Result<Self, RunError> {
        let diet = require(raw, keys::DIETARY_RESTRICTIONS)?;
        let cuisine = require(raw, keys::PREFERRED_CUISINE)?;
        let avoid = require(raw, keys::AVOID_INGREDIENTS)?;
        let include = raw
            .get(keys::INGREDIENT_FILTERS)
            .map(|v| (keys::INGREDIENT_FILTERS, v))
            .or_else(|| raw.get(keys::REQUIRED_INGREDIENTS).map(|v| (keys::REQUIRED_INGREDIENTS, v)))
            .ok_or_else(|| {
                RunError::invalid_preferences(
                    keys::INGREDIENT_FILTERS,
                    format!("is required (or '{}')", keys::REQUIRED_INGREDIENTS),
                )
            })?;

        let dietary_restrictions: Vec<String> = match diet {
            serde_json::Value::String(s) => s.split(',').map(str::to_string).collect(),
            other => string_list(keys::DIETARY_RESTRICTIONS, other)?,
        };

        let preferred_cuisine = cuisine
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RunError::invalid_preferences(keys::PREFERRED_CUISINE, "must be a non-empty string"))?;

        let mut prefs = Self::new(preferred_cuisine)
            .with_dietary_restrictions(dietary_restrictions)
            .with_avoid_ingredients(string_list(keys::AVOID_INGREDIENTS, avoid)?)
            .with_required_ingredients(string_list(include.0, include.1)?);

        if let Some(servings) = raw.get(keys::SERVINGS) {
            let n = servings
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .and_then(NonZeroU32::new)
                .ok_or_else(|| RunError::invalid_preferences(keys::SERVINGS, "must be a positive integer"))?;
            prefs = prefs.with_servings(n);
        }

        match raw.get(keys::DISH_TYPE) {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                prefs = prefs.with_dish_type(s.trim());
            }
            Some(_) => {
                return Err(RunError::invalid_preferences(keys::DISH_TYPE, "must be a non-empty string"));
            }
        }

        Ok(prefs)
    }

    /// Dietary restriction tags.
    #[must_use]
    pub fn dietary_restrictions(&self) -> &BTreeSet<String> {
        &self.dietary_restrictions
    }

    /// Preferred cuisine.
    #[must_use]
    pub fn preferred_cuisine(&self) -> &str {
        &self.preferred_cuisine
    }

    /// Ingredients to avoid.
    #[must_use]
    pub fn avoid_ingredients(&self) -> &BTreeSet<String> {
        &self.avoid_ingredients
    }

    /// Ingredients that must be included.
    #[must_use]
    pub fn required_ingredients(&self) -> &BTreeSet<String> {
        &self.required_ingredients
    }

    /// Serving count.
    #[must_use]
    pub fn servings(&self) -> NonZeroU32 {
        self.servings
    }

    /// Dish type, if any.
    #[must_use]
    pub fn dish_type(&self) -> Option<&str> {
        self.dish_type.as_deref()
    }

    /// Returns the keys this preference set writes into a fresh run context.
    #[must_use]
    pub fn to_seed(&self) -> StageData {
        let mut seed = StageData::new();
        seed.insert(
            keys::DIETARY_RESTRICTIONS.to_string(),
            serde_json::json!(self.dietary_restrictions),
        );
        seed.insert(
            keys::PREFERRED_CUISINE.to_string(),
            serde_json::json!(self.preferred_cuisine),
        );
        seed.insert(
            keys::AVOID_INGREDIENTS.to_string(),
            serde_json::json!(self.avoid_ingredients),
        );
        seed.insert(
            keys::INGREDIENT_FILTERS.to_string(),
            serde_json::json!(self.required_ingredients),
        );
        seed.insert(keys::SERVINGS.to_string(), serde_json::json!(self.servings.get()));
        if let Some(ref dish_type) = self.dish_type {
            seed.insert(keys::DISH_TYPE.to_string(), serde_json::json!(dish_type));
        }
        seed.insert(keys::PREFERENCES.to_string(), serde_json::json!(self));
        seed
    }
}

fn normalize(items: impl IntoIterator<Item = impl Into<String>>) -> BTreeSet<String> {
    items
        .into_iter()
        .map(Into::into)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn require<'a>(
    raw: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a serde_json::Value, RunError> {
    raw.get(key)
        .ok_or_else(|| RunError::invalid_preferences(key, "is required"))
}

fn string_list(key: &str, value: &serde_json::Value) -> Result<Vec<String>, RunError> {
    let items = value
        .as_array()
        .ok_or_else(|| RunError::invalid_preferences(key, "must be a list of strings"))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| RunError::invalid_preferences(key, "must be a list of strings"))
        })
        .collect()
}
