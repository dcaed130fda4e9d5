//! Prompt templates and role descriptions for the recipe stages.

/// Role sent ahead of search and detail prompts.
pub const RECIPE_EXPERT: &str = "You are a Recipe Expert: an expert chef specializing in \
finding recipes that fit dietary needs. Find and provide detailed descriptions of recipes \
tailored to specific criteria.";

/// Role sent ahead of custom recipe prompts.
pub const RECIPE_CREATOR: &str = "You are a Recipe Creator: a chef who invents original \
recipes from a list of ingredients while respecting every dietary constraint.";

/// Role sent ahead of formatting prompts.
pub const RECIPE_FORMATTER: &str = "You are a Recipe Formatter: an assistant specialized in \
formatting recipes into a polished format that is easy to read and follow.";

/// Section headings of a formatted recipe, in canonical order.
pub const FORMAT_HEADINGS: [&str; 6] = [
    "Name",
    "Ingredients",
    "Steps",
    "Cooking Time",
    "Servings",
    "Notes",
];

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Builds the search prompt.
#[must_use]
pub fn search_prompt(
    dietary_restrictions: &[String],
    preferred_cuisine: &str,
    avoid_ingredients: &[String],
    ingredient_filters: &[String],
    max_results: usize,
) -> String {
    format!(
        "Task: search recipes\n\
         Find up to {max_results} existing recipes that match the following criteria:\n\
         1. Dietary Restrictions: {}\n\
         2. Preferred Cuisine: {preferred_cuisine}\n\
         3. Avoid Ingredients: {}\n\
         4. Must Include Ingredients: {}\n\
         Answer with one recipe identifier per line, written as `id: <identifier>`, \
         and nothing else.",
        join_or_none(dietary_restrictions),
        join_or_none(avoid_ingredients),
        join_or_none(ingredient_filters),
    )
}

/// Builds the detail prompt for one recipe id.
#[must_use]
pub fn fetch_prompt(recipe_id: &str) -> String {
    format!(
        "Task: fetch recipe details\n\
         Provide detailed information about the recipe with ID: {recipe_id}. \
         Include the title, the list of ingredients and step-by-step instructions."
    )
}

/// Builds the custom recipe prompt.
#[must_use]
pub fn custom_prompt(
    preferences: &serde_json::Map<String, serde_json::Value>,
    ingredient_filters: &[String],
) -> String {
    let field = |key: &str| match preferences.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => {
            let items: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            join_or_none(&items)
        }
        Some(serde_json::Value::Null) | None => "none".to_string(),
        Some(other) => other.to_string(),
    };

    let mut prompt = format!(
        "Task: create custom recipe\n\
         Create an original recipe using these ingredients: {}.\n\
         Dietary Restrictions: {}\n\
         Preferred Cuisine: {}\n\
         Avoid Ingredients: {}\n\
         Servings: {}",
        join_or_none(ingredient_filters),
        field("dietary_restrictions"),
        field("preferred_cuisine"),
        field("avoid_ingredients"),
        field("servings"),
    );
    if let Some(dish_type) = preferences.get("dish_type").and_then(|v| v.as_str()) {
        prompt.push_str(&format!("\nDish Type: {dish_type}"));
    }
    prompt.push_str("\nGive the recipe a title, the ingredients with quantities and the steps.");
    prompt
}

/// Builds the formatting prompt.
///
/// `references` are the usable detail texts; failed fetches are left out by
/// the caller.
#[must_use]
pub fn format_prompt(references: &[String], custom_recipe: &str) -> String {
    let mut prompt = String::from("Task: format recipe\n");
    prompt.push_str(
        "Format the custom recipe below into easy-to-follow instructions. \
         Use exactly these headings, in this order, each on its own line followed by a colon: ",
    );
    prompt.push_str(&FORMAT_HEADINGS.join(", "));
    prompt.push_str(".\n\nCustom recipe:\n");
    prompt.push_str(custom_recipe);

    if !references.is_empty() {
        prompt.push_str("\n\nReference recipes:\n");
        for (i, reference) in references.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, reference));
        }
    }

    prompt
}
