//! Final formatting stage.

use super::fetch_details::DetailRecord;
use super::prompts::{self, FORMAT_HEADINGS, RECIPE_FORMATTER};
use super::{Stage, StageContract, StageResult};
use crate::context::{keys, StageData, StageInputs};
use crate::errors::StageFailure;
use crate::provider::{CapabilityProvider, GenerationParams, GenerationRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Returns true if `line` opens the section `heading`.
fn is_heading_line(line: &str, heading: &str) -> bool {
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| matches!(c, '#' | '*' | '_' | '-' | ' '))
        .trim_end_matches(|c: char| matches!(c, '*' | '_' | ' '));

    let Some(prefix) = stripped.get(..heading.len()) else {
        return false;
    };
    if !prefix.eq_ignore_ascii_case(heading) {
        return false;
    }

    let rest = stripped[heading.len()..].trim_start_matches(|c: char| matches!(c, '*' | '_'));
    rest.is_empty() || rest.starts_with(':')
}

/// Adds every canonical heading missing from `text`.
///
/// A missing heading goes right before the first later canonical heading
/// that is present, so canonical order survives. Missing headings with no
/// later heading present are appended at the end. Headings already present
/// are left where they are.
#[must_use]
pub fn normalize_headings(text: &str) -> String {
    let body = text.trim_end();

    // Byte offset of the first line carrying each heading.
    let positions: Vec<Option<usize>> = FORMAT_HEADINGS
        .iter()
        .map(|heading| {
            let mut offset = 0;
            body.split_inclusive('\n').find_map(|line| {
                let start = offset;
                offset += line.len();
                is_heading_line(line, heading).then_some(start)
            })
        })
        .collect();

    let mut inserts: Vec<(usize, &str)> = Vec::new();
    let mut trailing = Vec::new();
    for (i, heading) in FORMAT_HEADINGS.iter().enumerate() {
        if positions[i].is_some() {
            continue;
        }
        match positions[i + 1..].iter().flatten().next() {
            Some(&at) => inserts.push((at, heading)),
            None => trailing.push(*heading),
        }
    }
    inserts.sort_by_key(|&(at, _)| at);

    let mut formatted = String::with_capacity(body.len() + 16 * (inserts.len() + trailing.len()));
    let mut cursor = 0;
    for (at, heading) in inserts {
        formatted.push_str(&body[cursor..at]);
        formatted.push_str(heading);
        formatted.push_str(":\n\n");
        cursor = at;
    }
    formatted.push_str(&body[cursor..]);

    for heading in trailing {
        if !formatted.is_empty() {
            formatted.push_str("\n\n");
        }
        formatted.push_str(heading);
        formatted.push(':');
    }
    formatted
}

/// Asks the provider to lay the custom recipe out under fixed headings.
pub struct FormatStage {
    contract: StageContract,
    provider: Arc<dyn CapabilityProvider>,
    params: GenerationParams,
}

impl std::fmt::Debug for FormatStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatStage")
            .field("name", &self.contract.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl FormatStage {
    /// Stage name.
    pub const NAME: &'static str = "format_recipe";

    /// Creates the stage with default parameters.
    #[must_use]
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            contract: StageContract::new(Self::NAME)
                .requires([keys::RECIPE_DETAILS, keys::CUSTOM_RECIPE])
                .produces([keys::FORMATTED_RECIPE]),
            provider,
            params: GenerationParams::default(),
        }
    }

    /// Sets the generation parameters.
    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl Stage for FormatStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, inputs: &StageInputs) -> StageResult {
        let details: Vec<DetailRecord> =
            serde_json::from_value(inputs.get(keys::RECIPE_DETAILS)?.clone()).map_err(|e| {
                StageFailure::invalid_input(keys::RECIPE_DETAILS, e.to_string())
            })?;
        let custom = inputs.get_str(keys::CUSTOM_RECIPE)?;

        let references: Vec<String> = details
            .iter()
            .filter_map(DetailRecord::detail)
            .map(str::to_string)
            .collect();
        debug!(
            references = references.len(),
            skipped = details.len() - references.len(),
            "Formatting recipe"
        );

        let request = GenerationRequest::new(prompts::format_prompt(&references, custom), self.params)
            .with_system(RECIPE_FORMATTER);
        let response = self.provider.generate(&request).await?;

        let formatted = normalize_headings(&response);
        if formatted.len() != response.trim_end().len() {
            warn!("Formatted recipe was missing headings; appended empty sections");
        }

        let mut output = StageData::new();
        output.insert(keys::FORMATTED_RECIPE.to_string(), serde_json::json!(formatted));
        Ok(output)
    }
}
