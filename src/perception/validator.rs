use serde::{Deserialize, Serialize};

use crate::perception::matcher::{self, ElementMatch, FindOptions, MatchType};
use crate::perception::types::{AnalysisResult, ParsedElement};

/// What the validator searches: parsed elements or a raw analysis reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationInput {
    Elements(Vec<ParsedElement>),
    Analysis(AnalysisResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", content = "message", rename_all = "snake_case")]
pub enum ValidationFailure {
    /// The vision analysis itself failed or carried no data.
    UpstreamAnalysis(String),
    /// The search could not run on the supplied input.
    MalformedInput(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    pub exists: bool,
    pub count: usize,
    pub matches: Vec<ElementMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ValidationFailure>,
}

impl ValidationReport {
    fn failed(failure: ValidationFailure) -> Self {
        Self {
            success: false,
            exists: false,
            count: 0,
            matches: Vec::new(),
            failure: Some(failure),
        }
    }
}

/// Answers "is there an element whose text contains `description`".
///
/// Zero matches is a successful report with `exists == false`.
pub fn exists(input: &ValidationInput, description: &str) -> ValidationReport {
    let owned;
    let elements: &[ParsedElement] = match input {
        ValidationInput::Elements(elements) => elements,
        ValidationInput::Analysis(analysis) => {
            if !analysis.success {
                let msg = analysis
                    .error
                    .clone()
                    .unwrap_or_else(|| "analysis failed without an error message".into());
                return ValidationReport::failed(ValidationFailure::UpstreamAnalysis(msg));
            }
            if analysis.data.is_none() {
                return ValidationReport::failed(ValidationFailure::UpstreamAnalysis(
                    "analysis succeeded but returned no data".into(),
                ));
            }
            owned = analysis.elements();
            &owned
        }
    };

    let opts = FindOptions {
        match_type: MatchType::Contains,
        ..FindOptions::default()
    };
    match matcher::find(elements, description, &opts) {
        Ok(matches) => {
            tracing::debug!(description = %description, count = matches.len(), "validated element");
            ValidationReport {
                success: true,
                exists: !matches.is_empty(),
                count: matches.len(),
                matches,
                failure: None,
            }
        }
        Err(e) => ValidationReport::failed(ValidationFailure::MalformedInput(e.to_string())),
    }
}
