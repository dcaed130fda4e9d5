//! Canned provider responses and caller inputs.

use crate::context::PreferenceSet;
use std::num::NonZeroU32;

/// Search answer listing three labelled ids.
pub const SEARCH_RESPONSE: &str = "Here are three matching recipes:\n\
1. id: caprese-pasta (Pasta alla Caprese)\n\
2. id: tomato-basil-risotto\n\
3. id: margherita-polenta";

/// Detail answer used for every id.
pub const DETAIL_RESPONSE: &str = "A vegetarian Italian dish of ripe tomato, fresh basil and \
mozzarella cheese. Serves 4; ready in 30 minutes.";

/// Custom recipe answer.
pub const CUSTOM_RESPONSE: &str = "Gluten-free Tomato Basil Polenta Bake\n\
Ingredients: polenta, tomato, basil, mozzarella cheese, olive oil\n\
Steps: cook the polenta, layer with tomato and cheese, bake, finish with basil.";

/// Formatted answer carrying every heading.
pub const FORMAT_RESPONSE: &str = "Name: Gluten-free Tomato Basil Polenta Bake\n\n\
Ingredients:\n- 250 g polenta\n- 4 tomatoes\n- 1 bunch basil\n- 200 g mozzarella cheese\n\n\
Steps:\n1. Cook the polenta.\n2. Layer with tomato and cheese.\n3. Bake for 20 minutes.\n\n\
Cooking Time: 40 minutes\n\n\
Servings: 4\n\n\
Notes: Naturally gluten-free.";

/// The raw caller mapping of the reference scenario.
#[must_use]
pub fn sample_preferences() -> serde_json::Map<String, serde_json::Value> {
    let value = serde_json::json!({
        "dietary_restrictions": "vegetarian",
        "preferred_cuisine": "Italian",
        "avoid_ingredients": ["gluten"],
        "ingredient_filters": ["tomato", "basil", "cheese"],
        "servings": 4,
        "dish_type": "main course",
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// The reference scenario as a validated preference set.
#[must_use]
pub fn sample_preference_set() -> PreferenceSet {
    PreferenceSet::new("Italian")
        .with_dietary_restrictions(["vegetarian"])
        .with_avoid_ingredients(["gluten"])
        .with_required_ingredients(["tomato", "basil", "cheese"])
        .with_servings(NonZeroU32::new(4).unwrap_or(NonZeroU32::MIN))
        .with_dish_type("main course")
}
