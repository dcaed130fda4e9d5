//! Recipe search stage.

use super::prompts::{self, RECIPE_EXPERT};
use super::{Stage, StageContract, StageResult};
use crate::context::{keys, StageData, StageInputs};
use crate::errors::ProviderError;
use crate::provider::{CapabilityProvider, GenerationParams, GenerationRequest};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// Token limit for search calls.
pub const SEARCH_MAX_TOKENS: u32 = 200;

const DEFAULT_MAX_RESULTS: usize = 5;

/// Leading bullet, numbering or heading marker.
static LIST_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:[-*+•]\s*|\(?\d{1,3}[.):]\s*|#+\s*)+").ok());

/// An explicit `id: value` label.
static ID_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bid\s*[:=#]\s*([^,;|()]+)").ok());

fn clean(candidate: &str) -> &str {
    candidate
        .trim()
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '*' | '_'))
        .trim_end_matches(|c: char| matches!(c, '.' | ':' | '!' | '?'))
        .trim()
}

fn strip_marker(line: &str) -> &str {
    LIST_MARKER
        .as_ref()
        .and_then(|re| re.find(line))
        .map_or(line, |m| &line[m.end()..])
}

fn labelled_id(line: &str) -> Option<&str> {
    ID_LABEL
        .as_ref()?
        .captures(line)?
        .get(1)
        .map(|m| m.as_str())
}

/// Extracts recipe identifiers from a free-text search response.
///
/// One id per non-empty line, with list markers stripped. When any line
/// carries an explicit `id:` label only labelled lines count. Duplicates are
/// dropped and at most `max` ids are returned, in order of appearance.
#[must_use]
pub fn parse_recipe_ids(text: &str, max: usize) -> Vec<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let labelled = lines.iter().any(|l| labelled_id(l).is_some());

    let candidates = lines.into_iter().filter_map(|line| {
        if labelled {
            labelled_id(line).map(clean)
        } else {
            Some(clean(strip_marker(line)))
        }
    });

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for id in candidates {
        if id.is_empty() || !seen.insert(id.to_lowercase()) {
            continue;
        }
        ids.push(id.to_string());
        if ids.len() >= max {
            break;
        }
    }
    ids
}

/// Asks the provider for matching recipes and parses their ids.
pub struct SearchStage {
    contract: StageContract,
    provider: Arc<dyn CapabilityProvider>,
    params: GenerationParams,
    max_results: usize,
}

impl std::fmt::Debug for SearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchStage")
            .field("name", &self.contract.name)
            .field("params", &self.params)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

impl SearchStage {
    /// Stage name.
    pub const NAME: &'static str = "search_recipes";

    /// Creates the stage with default parameters.
    #[must_use]
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            contract: StageContract::new(Self::NAME)
                .requires([
                    keys::DIETARY_RESTRICTIONS,
                    keys::PREFERRED_CUISINE,
                    keys::AVOID_INGREDIENTS,
                    keys::INGREDIENT_FILTERS,
                ])
                .produces([keys::RECIPE_IDS]),
            provider,
            params: GenerationParams::default().with_max_tokens(SEARCH_MAX_TOKENS),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Sets the generation parameters.
    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the maximum number of ids kept.
    #[must_use]
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.max(1);
        self
    }
}

#[async_trait]
impl Stage for SearchStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, inputs: &StageInputs) -> StageResult {
        let prompt = prompts::search_prompt(
            &inputs.get_string_list(keys::DIETARY_RESTRICTIONS)?,
            inputs.get_str(keys::PREFERRED_CUISINE)?,
            &inputs.get_string_list(keys::AVOID_INGREDIENTS)?,
            &inputs.get_string_list(keys::INGREDIENT_FILTERS)?,
            self.max_results,
        );

        let request = GenerationRequest::new(prompt, self.params).with_system(RECIPE_EXPERT);
        let response = self.provider.generate(&request).await?;
        debug!(chars = response.len(), "Search response received");

        let ids = parse_recipe_ids(&response, self.max_results);
        if ids.is_empty() {
            return Err(ProviderError::EmptyResponse(
                "search response contained no recipe ids".to_string(),
            )
            .into());
        }

        info!(count = ids.len(), "Found recipe ids");

        let mut output = StageData::new();
        output.insert(keys::RECIPE_IDS.to_string(), serde_json::json!(ids));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageFailure;
    use crate::testing::ScriptedProvider;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn search_inputs() -> StageInputs {
        StageInputs::new(
            SearchStage::NAME,
            HashMap::from([
                (keys::DIETARY_RESTRICTIONS.to_string(), serde_json::json!(["vegetarian"])),
                (keys::PREFERRED_CUISINE.to_string(), serde_json::json!("Italian")),
                (keys::AVOID_INGREDIENTS.to_string(), serde_json::json!(["gluten"])),
                (keys::INGREDIENT_FILTERS.to_string(), serde_json::json!(["tomato", "basil"])),
            ]),
        )
    }

    #[test]
    fn test_parse_plain_lines_with_markers() {
        let text = "1. caprese-salad\n2) pasta-pomodoro\n- risotto-basilico\n\n* caprese-salad\n";
        assert_eq!(
            parse_recipe_ids(text, 5),
            vec!["caprese-salad", "pasta-pomodoro", "risotto-basilico"]
        );
    }

    #[test]
    fn test_parse_labelled_lines_only() {
        let text = "Here are some recipes:\n1. id: r1 (Caprese)\n2. ID: `r2`\nEnjoy!\n- id=r3, tomato soup";
        assert_eq!(parse_recipe_ids(text, 5), vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_parse_respects_cap() {
        let text = "a\nb\nc\nd\ne\nf\ng";
        assert_eq!(parse_recipe_ids(text, 5).len(), 5);
        assert_eq!(parse_recipe_ids(text, 2), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_recipe_ids("", 5).is_empty());
        assert!(parse_recipe_ids("  \n - \n", 5).is_empty());
    }

    #[tokio::test]
    async fn test_search_stage_outputs_ids() {
        let provider = Arc::new(ScriptedProvider::fixed("id: r1\nid: r2"));
        let stage = SearchStage::new(provider.clone());

        let output = stage.execute(&search_inputs()).await.unwrap();
        assert_eq!(output[keys::RECIPE_IDS], serde_json::json!(["r1", "r2"]));

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Preferred Cuisine: Italian"));
    }

    #[tokio::test]
    async fn test_search_stage_no_ids_is_empty_response() {
        let stage = SearchStage::new(Arc::new(ScriptedProvider::fixed("   ")));

        let err = stage.execute(&search_inputs()).await.unwrap_err();
        assert!(matches!(
            err,
            StageFailure::Provider(ProviderError::EmptyResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_search_stage_propagates_provider_error() {
        let stage = SearchStage::new(Arc::new(ScriptedProvider::fixed("r1").fail_on_call(1)));

        let err = stage.execute(&search_inputs()).await.unwrap_err();
        assert!(matches!(err, StageFailure::Provider(ProviderError::Unavailable(_))));
    }
}
