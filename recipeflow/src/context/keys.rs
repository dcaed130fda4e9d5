//! Well-known context keys.

/// Dietary restriction tags (list of strings).
pub const DIETARY_RESTRICTIONS: &str = "dietary_restrictions";
/// Preferred cuisine (string).
pub const PREFERRED_CUISINE: &str = "preferred_cuisine";
/// Ingredients to avoid (list of strings).
pub const AVOID_INGREDIENTS: &str = "avoid_ingredients";
/// Ingredients the recipe must include (list of strings).
pub const INGREDIENT_FILTERS: &str = "ingredient_filters";
/// Accepted alias for [`INGREDIENT_FILTERS`] in caller input.
pub const REQUIRED_INGREDIENTS: &str = "required_ingredients";
/// Serving count (positive integer).
pub const SERVINGS: &str = "servings";
/// Dish type, e.g. "main course" (string, optional).
pub const DISH_TYPE: &str = "dish_type";
/// The whole preference set as a nested mapping.
pub const PREFERENCES: &str = "preferences";

/// Identifiers found by the search stage.
pub const RECIPE_IDS: &str = "recipe_ids";
/// One detail record per recipe id.
pub const RECIPE_DETAILS: &str = "recipe_details";
/// The generated custom recipe.
pub const CUSTOM_RECIPE: &str = "custom_recipe";
/// The final formatted recipe.
pub const FORMATTED_RECIPE: &str = "formatted_recipe";
