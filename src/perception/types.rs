use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Element id → `[x, y, ...]` as reported by the vision service.
pub type CoordinateMap = BTreeMap<String, Vec<f64>>;

/// One on-screen element recovered from a vision-service parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedElement {
    pub element_type: String,
    /// Unique within one parse response.
    pub element_id: String,
    pub text: String,
    /// Normalized 0..1 centre, absent when the id had no coordinates.
    pub center_x: Option<f64>,
    pub center_y: Option<f64>,
}

impl ParsedElement {
    pub fn position(&self) -> Option<NormalizedPoint> {
        match (self.center_x, self.center_y) {
            (Some(x), Some(y)) => Some(NormalizedPoint { x, y }),
            _ => None,
        }
    }
}

/// A position expressed as a fraction of page width/height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn is_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// A position in CSS pixels of the current viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    /// Newline-delimited `<ElementType> ID <n>: <text>` lines.
    #[serde(default)]
    pub raw_text_block: String,
    #[serde(default)]
    pub coordinate_map: CoordinateMap,
}

/// Normalized reply of the vision service.
///
/// `data` is present iff `success` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Extra detail for failures, e.g. the body of a non-2xx reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AnalysisResult {
    pub fn ok(data: AnalysisData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Joins the text block with the coordinate map. Empty for failed results.
    pub fn elements(&self) -> Vec<ParsedElement> {
        match (&self.data, self.success) {
            (Some(data), true) => {
                crate::perception::parser::parse_with_map(&data.raw_text_block, &data.coordinate_map)
            }
            _ => Vec::new(),
        }
    }
}
