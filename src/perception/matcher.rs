use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ParasightError, ParasightResult};
use crate::perception::types::{NormalizedPoint, ParsedElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    StartsWith,
    EndsWith,
}

impl MatchType {
    fn matches(self, haystack: &str, needle: &str) -> bool {
        match self {
            MatchType::Contains => haystack.contains(needle),
            MatchType::Exact => haystack == needle,
            MatchType::StartsWith => haystack.starts_with(needle),
            MatchType::EndsWith => haystack.ends_with(needle),
        }
    }
}

impl FromStr for MatchType {
    type Err = ParasightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "startswith" => Ok(MatchType::StartsWith),
            "endswith" => Ok(MatchType::EndsWith),
            other => Err(ParasightError::Input(format!("unknown match type '{other}'"))),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchType::Contains => "contains",
            MatchType::Exact => "exact",
            MatchType::StartsWith => "startswith",
            MatchType::EndsWith => "endswith",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            match_type: MatchType::Contains,
            case_sensitive: false,
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMatch {
    pub element_id: String,
    pub element_type: String,
    pub text: String,
    pub position: Option<NormalizedPoint>,
}

impl From<&ParsedElement> for ElementMatch {
    fn from(el: &ParsedElement) -> Self {
        Self {
            element_id: el.element_id.clone(),
            element_type: el.element_type.clone(),
            text: el.text.clone(),
            position: el.position(),
        }
    }
}

/// Linear scan in source order; returns the first `max_results` hits.
pub fn find(
    elements: &[ParsedElement],
    description: &str,
    opts: &FindOptions,
) -> ParasightResult<Vec<ElementMatch>> {
    if description.trim().is_empty() {
        return Err(ParasightError::Input("element description is empty".into()));
    }
    if opts.max_results == 0 {
        return Err(ParasightError::Input("max_results must be at least 1".into()));
    }

    let needle = if opts.case_sensitive {
        description.to_string()
    } else {
        description.to_lowercase()
    };

    let matches: Vec<ElementMatch> = elements
        .iter()
        .filter(|el| {
            if opts.case_sensitive {
                opts.match_type.matches(&el.text, &needle)
            } else {
                opts.match_type.matches(&el.text.to_lowercase(), &needle)
            }
        })
        .take(opts.max_results)
        .map(ElementMatch::from)
        .collect();

    tracing::debug!(
        description = %description,
        match_type = %opts.match_type,
        case_sensitive = opts.case_sensitive,
        found = matches.len(),
        "element search"
    );
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(id: &str, text: &str) -> ParsedElement {
        ParsedElement {
            element_type: "Button".into(),
            element_id: id.into(),
            text: text.into(),
            center_x: Some(0.1),
            center_y: Some(0.2),
        }
    }

    #[test]
    fn test_case_policy() {
        let elements = vec![el("0", "Login")];
        let insensitive = FindOptions::default();
        assert_eq!(find(&elements, "login", &insensitive).unwrap().len(), 1);

        let sensitive = FindOptions { case_sensitive: true, ..FindOptions::default() };
        assert!(find(&elements, "login", &sensitive).unwrap().is_empty());
        assert_eq!(find(&elements, "Login", &sensitive).unwrap().len(), 1);
    }

    #[test]
    fn test_match_types() {
        let elements = vec![el("0", "Sign in now"), el("1", "Sign"), el("2", "Resign")];
        let run = |mt| {
            let opts = FindOptions { match_type: mt, ..FindOptions::default() };
            find(&elements, "sign", &opts)
                .unwrap()
                .into_iter()
                .map(|m| m.element_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(MatchType::Contains), vec!["0", "1", "2"]);
        assert_eq!(run(MatchType::Exact), vec!["1"]);
        assert_eq!(run(MatchType::StartsWith), vec!["0", "1"]);
        assert_eq!(run(MatchType::EndsWith), vec!["1", "2"]);
    }

    #[test]
    fn test_max_results_keeps_source_order() {
        let elements: Vec<_> = (0..10).map(|i| el(&i.to_string(), "item")).collect();
        let opts = FindOptions::default();
        let first = find(&elements, "item", &opts).unwrap();
        let second = find(&elements, "item", &opts).unwrap();
        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|m| m.element_id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_null_position_passes_through() {
        let mut e = el("7", "Password");
        e.center_x = None;
        let found = find(&[e], "pass", &FindOptions::default()).unwrap();
        assert_eq!(found[0].position, None);
    }

    #[test]
    fn test_invalid_inputs() {
        let elements = vec![el("0", "Login")];
        assert!(matches!(
            find(&elements, "  ", &FindOptions::default()),
            Err(ParasightError::Input(_))
        ));
        let zero = FindOptions { max_results: 0, ..FindOptions::default() };
        assert!(matches!(find(&elements, "login", &zero), Err(ParasightError::Input(_))));
    }

    #[test]
    fn test_match_type_serde_literals() {
        let mt: MatchType = serde_json::from_str("\"startswith\"").unwrap();
        assert_eq!(mt, MatchType::StartsWith);
        assert_eq!("endswith".parse::<MatchType>().unwrap(), MatchType::EndsWith);
        assert!("fuzzy".parse::<MatchType>().is_err());
    }
}
