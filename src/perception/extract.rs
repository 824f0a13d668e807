use serde::{Deserialize, Serialize};

use crate::perception::types::{NormalizedPoint, ParsedElement};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub element_type: String,
    pub position: Option<NormalizedPoint>,
}

/// Non-empty element texts in source order, optionally restricted to one
/// element type (compared case-insensitively).
pub fn extract_text(elements: &[ParsedElement], element_type: Option<&str>) -> Vec<ExtractedText> {
    elements
        .iter()
        .filter(|el| element_type.map_or(true, |t| el.element_type.eq_ignore_ascii_case(t)))
        .filter_map(|el| {
            let text = el.text.trim();
            (!text.is_empty()).then(|| ExtractedText {
                text: text.to_string(),
                element_type: el.element_type.clone(),
                position: el.position(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::parser;

    #[test]
    fn test_filters_by_type_and_skips_blank() {
        let elements = parser::parse(
            "Text Box ID 0: Username\nIcon ID 1:   \nButton ID 2: Login\ntext box ID 3: Password",
            "{'0': [0.1, 0.1], '2': [0.5, 0.6]}",
        );
        let all = extract_text(&elements, None);
        assert_eq!(all.len(), 3);

        let boxes = extract_text(&elements, Some("Text Box"));
        let texts: Vec<_> = boxes.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Username", "Password"]);
        assert_eq!(boxes[1].position, None);
    }
}
