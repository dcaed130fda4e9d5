//! `recipeflow` command line: search, fetch, customise and format a recipe.

use anyhow::{Context, Result};
use clap::Parser;
use recipeflow::config::{load_preferences_file, AppConfig};
use recipeflow::context::keys;
use recipeflow::coordinator::RecipeCoordinator;
use recipeflow::events::LoggingEventSink;
use recipeflow::observability::{init_tracing, LogFormat};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Generate a custom recipe from dietary preferences.
#[derive(Parser, Debug)]
#[command(name = "recipeflow", version, about)]
struct Args {
    /// JSON file with the preference mapping; overrides the flags below
    #[arg(short, long)]
    preferences: Option<PathBuf>,

    /// Dietary restriction tags, comma-separated
    #[arg(long, default_value = "vegetarian")]
    diet: String,

    /// Preferred cuisine
    #[arg(long, default_value = "Italian")]
    cuisine: String,

    /// Ingredient to avoid (repeatable)
    #[arg(long = "avoid", default_values_t = [String::from("gluten")])]
    avoid: Vec<String>,

    /// Ingredient to include (repeatable)
    #[arg(
        long = "include",
        default_values_t = [String::from("tomato"), String::from("basil"), String::from("cheese")]
    )]
    include: Vec<String>,

    /// Number of servings
    #[arg(long, default_value_t = 4)]
    servings: u32,

    /// Dish type, e.g. "main course"
    #[arg(long, default_value = "main course")]
    dish_type: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "RECIPEFLOW_JSON_LOGS")]
    json_logs: bool,

    /// Print the full run report as JSON instead of the recipe text
    #[arg(long)]
    report: bool,
}

impl Args {
    fn preference_mapping(&self) -> Result<Map<String, Value>> {
        if let Some(ref path) = self.preferences {
            return load_preferences_file(path)
                .with_context(|| format!("loading preferences from {}", path.display()));
        }

        let mut map = Map::new();
        map.insert(keys::DIETARY_RESTRICTIONS.to_string(), json!(self.diet));
        map.insert(keys::PREFERRED_CUISINE.to_string(), json!(self.cuisine));
        map.insert(keys::AVOID_INGREDIENTS.to_string(), json!(self.avoid));
        map.insert(keys::INGREDIENT_FILTERS.to_string(), json!(self.include));
        map.insert(keys::SERVINGS.to_string(), json!(self.servings));
        map.insert(keys::DISH_TYPE.to_string(), json!(self.dish_type));
        Ok(map)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let format = if args.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    init_tracing(format)?;

    let config = AppConfig::from_env().context("loading provider configuration")?;
    let preferences = args.preference_mapping()?;
    let coordinator = RecipeCoordinator::from_config(&config, Arc::new(LoggingEventSink::default()))?;

    if args.report {
        let report = coordinator.run_report(&preferences).await;
        println!("{}", report.to_json()?);
        if let Some(err) = report.error {
            anyhow::bail!(err);
        }
        return Ok(());
    }

    let recipe = coordinator.run(&preferences).await?;
    println!("{recipe}");
    Ok(())
}
