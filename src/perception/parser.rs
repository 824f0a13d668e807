//! Joins the vision service's text block with its coordinate map into
//! `ParsedElement`s.
//!
//! Text block lines look like `Text Box ID 0: demo`; lines that do not follow
//! that pattern are dropped. Coordinate values are `[x, y, ...]` keyed by the
//! same id string.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::{ParasightError, ParasightResult};
use crate::perception::literal;
use crate::perception::types::{CoordinateMap, ParsedElement};

fn element_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(.+?)\s+ID\s+(\d+)\s*:\s*(.*?)\s*$").expect("element line regex must compile")
    })
}

/// Parses a text block plus a literal coordinate-map dump.
///
/// A coordinate map that cannot be read degrades to an empty map so the
/// text-only elements survive with null positions.
pub fn parse(raw_text_block: &str, coordinate_map_text: &str) -> Vec<ParsedElement> {
    let coordinates = if coordinate_map_text.trim().is_empty() {
        CoordinateMap::new()
    } else {
        parse_coordinate_map(coordinate_map_text).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "coordinate map unreadable, continuing without positions");
            CoordinateMap::new()
        })
    };
    parse_with_map(raw_text_block, &coordinates)
}

pub fn parse_with_map(raw_text_block: &str, coordinates: &CoordinateMap) -> Vec<ParsedElement> {
    let re = element_line_re();
    let mut elements = Vec::new();
    for line in raw_text_block.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let element_id = caps[2].to_string();
        let (center_x, center_y) = match coordinates.get(&element_id) {
            Some(values) if values.len() >= 2 => (Some(values[0]), Some(values[1])),
            _ => (None, None),
        };
        elements.push(ParsedElement {
            element_type: caps[1].trim().to_string(),
            element_id,
            text: caps[3].to_string(),
            center_x,
            center_y,
        });
    }
    tracing::debug!(
        count = elements.len(),
        positioned = elements.iter().filter(|e| e.center_x.is_some()).count(),
        "parsed elements"
    );
    elements
}

/// Reads a literal (or JSON) mapping dump into a `CoordinateMap`.
pub fn parse_coordinate_map(text: &str) -> ParasightResult<CoordinateMap> {
    let value = literal::parse_literal(text)?;
    coordinate_map_from_value(&value)
}

/// Converts an already-decoded mapping into a `CoordinateMap`.
///
/// Non-numeric entries inside a value list are skipped; entries whose value
/// is not a list are rejected.
pub fn coordinate_map_from_value(value: &Value) -> ParasightResult<CoordinateMap> {
    let Value::Object(map) = value else {
        return Err(ParasightError::Format("coordinate map is not a mapping".into()));
    };
    let mut out = CoordinateMap::new();
    for (id, coords) in map {
        let Value::Array(items) = coords else {
            return Err(ParasightError::Format(format!(
                "coordinates for id {id} are not a list"
            )));
        };
        out.insert(id.clone(), items.iter().filter_map(Value::as_f64).collect());
    }
    Ok(out)
}
