//! Normalization of vision-service replies into `AnalysisResult`.
//!
//! Three reply shapes have been seen in the wild:
//!
//! - `NestedJson`: a JSON object whose `parsed_content_list` is a string and
//!   whose `label_coordinates` is a string holding another mapping.
//! - `ElementList`: a JSON object with a plain list of element records.
//! - `LiteralDump`: a literal-syntax mapping with numeric wrappers.
//!
//! Decoders run in that fixed order and the first structurally valid result
//! wins. `ShapePolicy` can pin decoding to one shape.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::config::ShapePolicy;
use crate::errors::{ParasightError, ParasightResult};
use crate::perception::literal;
use crate::perception::parser;
use crate::perception::types::{AnalysisData, AnalysisResult, CoordinateMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    NestedJson,
    ElementList,
    LiteralDump,
}

impl ResponseShape {
    pub fn name(self) -> &'static str {
        match self {
            ResponseShape::NestedJson => "nested_json",
            ResponseShape::ElementList => "element_list",
            ResponseShape::LiteralDump => "literal_dump",
        }
    }
}

const AUTO_ORDER: [ResponseShape; 3] = [
    ResponseShape::NestedJson,
    ResponseShape::ElementList,
    ResponseShape::LiteralDump,
];

fn decoder_order(policy: ShapePolicy) -> &'static [ResponseShape] {
    match policy {
        ShapePolicy::Auto => &AUTO_ORDER,
        ShapePolicy::NestedJson => &AUTO_ORDER[0..1],
        ShapePolicy::ElementList => &AUTO_ORDER[1..2],
        ShapePolicy::LiteralDump => &AUTO_ORDER[2..3],
    }
}

/// Decodes a response body, returning the shape that matched.
pub fn decode_body(body: &str, policy: ShapePolicy) -> ParasightResult<(ResponseShape, AnalysisResult)> {
    let body = unwrap_json_string(body);
    let json: Option<Value> = serde_json::from_str(&body).ok();

    for &shape in decoder_order(policy) {
        let decoded = match shape {
            ResponseShape::NestedJson => json.as_ref().and_then(decode_nested_json),
            ResponseShape::ElementList => json.as_ref().and_then(decode_element_list),
            ResponseShape::LiteralDump => decode_literal_dump(&body),
        };
        if let Some(result) = decoded {
            tracing::debug!(shape = shape.name(), success = result.success, "vision response decoded");
            return Ok((shape, result));
        }
    }

    let tried: Vec<&str> = decoder_order(policy).iter().map(|s| s.name()).collect();
    Err(ParasightError::Format(format!(
        "response matched no known shape (tried {})",
        tried.join(", ")
    )))
}

/// Some service builds JSON-encode the literal dump as a string.
fn unwrap_json_string(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(inner)) => inner,
        _ => body.to_string(),
    }
}

fn upstream_failure(obj: &Map<String, Value>) -> Option<AnalysisResult> {
    if obj.get("success") != Some(&Value::Bool(false)) {
        return None;
    }
    let error = obj
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("vision service reported failure");
    let mut result = AnalysisResult::failure(error);
    if let Some(msg) = obj.get("message").and_then(Value::as_str) {
        result = result.with_message(msg);
    }
    Some(result)
}

/// The object carrying `parsed_content_list`: `data` when present, else the root.
fn payload(obj: &Map<String, Value>) -> &Map<String, Value> {
    obj.get("data").and_then(Value::as_object).unwrap_or(obj)
}

fn decode_nested_json(json: &Value) -> Option<AnalysisResult> {
    let obj = json.as_object()?;
    if let Some(failure) = upstream_failure(obj) {
        return Some(failure);
    }
    let data = payload(obj);
    let raw_text_block = data.get("parsed_content_list")?.as_str()?.to_string();
    let coordinate_map = coordinates_field(data.get("label_coordinates"));
    Some(AnalysisResult::ok(AnalysisData {
        raw_text_block,
        coordinate_map,
    }))
}

fn decode_literal_dump(body: &str) -> Option<AnalysisResult> {
    let value = match literal::parse_literal(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "body is not a literal dump");
            return None;
        }
    };
    let obj = value.as_object()?;
    if let Some(failure) = upstream_failure(obj) {
        return Some(failure);
    }
    let data = payload(obj);
    let raw_text_block = match data.get("parsed_content_list")? {
        Value::String(s) => s.clone(),
        // a literal list of text lines
        Value::Array(lines) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    let coordinate_map = coordinates_field(data.get("label_coordinates"));
    Some(AnalysisResult::ok(AnalysisData {
        raw_text_block,
        coordinate_map,
    }))
}

/// `label_coordinates` may be an object, a JSON string or a literal string.
/// Unreadable coordinates degrade to an empty map.
fn coordinates_field(field: Option<&Value>) -> CoordinateMap {
    let decoded = match field {
        None | Some(Value::Null) => return CoordinateMap::new(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(v) => parser::coordinate_map_from_value(&v),
            Err(_) => parser::parse_coordinate_map(text),
        },
        Some(other) => parser::coordinate_map_from_value(other),
    };
    decoded.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "label coordinates unreadable, continuing without positions");
        CoordinateMap::new()
    })
}

fn decode_element_list(json: &Value) -> Option<AnalysisResult> {
    let obj = json.as_object()?;
    if let Some(failure) = upstream_failure(obj) {
        return Some(failure);
    }
    let data = payload(obj);
    let records = data
        .get("parsed_content_list")
        .or_else(|| data.get("elements"))?
        .as_array()?;

    let records = records
        .iter()
        .map(Value::as_object)
        .collect::<Option<Vec<_>>>()?;
    let ids = assign_ids(&records);

    let mut lines = Vec::with_capacity(records.len());
    let mut coordinate_map = CoordinateMap::new();
    for (rec, id) in records.into_iter().zip(ids) {
        let kind = rec
            .get("element_type")
            .or_else(|| rec.get("type"))
            .and_then(Value::as_str)
            .map(display_type)
            .unwrap_or_else(|| "Unknown".to_string());
        let text = rec
            .get("text")
            .or_else(|| rec.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .replace(['\n', '\r'], " ");
        lines.push(format!("{kind} ID {id}: {text}"));
        if let Some((x, y)) = record_center(rec) {
            coordinate_map.insert(id, vec![x, y]);
        }
    }

    Some(AnalysisResult::ok(AnalysisData {
        raw_text_block: lines.join("\n"),
        coordinate_map,
    }))
}

/// One unique id per record. Explicit ids are kept on first use; records
/// without one, or repeating one, take the lowest number not yet claimed.
fn assign_ids(records: &[&Map<String, Value>]) -> Vec<String> {
    let explicit: Vec<Option<String>> = records.iter().map(|rec| record_id(rec)).collect();
    let mut used: HashSet<String> = HashSet::new();
    let mut keep = vec![false; records.len()];
    for (i, id) in explicit.iter().enumerate() {
        if let Some(id) = id {
            keep[i] = used.insert(id.clone());
        }
    }

    let mut next = 0u64;
    explicit
        .into_iter()
        .zip(keep)
        .map(|(id, kept)| match id {
            Some(id) if kept => id,
            _ => {
                while used.contains(&next.to_string()) {
                    next += 1;
                }
                let fresh = next.to_string();
                used.insert(fresh.clone());
                fresh
            }
        })
        .collect()
}

fn record_id(rec: &Map<String, Value>) -> Option<String> {
    match rec.get("element_id").or_else(|| rec.get("id"))? {
        Value::String(s) if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn record_center(rec: &Map<String, Value>) -> Option<(f64, f64)> {
    let cx = rec.get("center_x").and_then(Value::as_f64);
    let cy = rec.get("center_y").and_then(Value::as_f64);
    if let (Some(x), Some(y)) = (cx, cy) {
        return Some((x, y));
    }
    let bbox: Vec<f64> = rec
        .get("bbox")?
        .as_array()?
        .iter()
        .filter_map(Value::as_f64)
        .collect();
    match bbox.as_slice() {
        [x1, y1, x2, y2] => Some(((x1 + x2) / 2.0, (y1 + y2) / 2.0)),
        _ => None,
    }
}

/// `text` → `Text`, `text box` → `Text box`.
fn display_type(raw: &str) -> String {
    let mut chars = raw.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_dump_with_wrappers() {
        let body = r#"{'success': True, 'data': {'parsed_content_list': 'Text Box ID 0: demo\nButton ID 1: Login', 'label_coordinates': "{'0': [np.float32(0.2), np.float32(0.3), np.float32(0.1), np.float32(0.05)], '1': [np.float32(0.5), np.float32(0.6), np.float32(0.1), np.float32(0.05)]}"}}"#;
        let (shape, result) = decode_body(body, ShapePolicy::Auto).unwrap();
        assert_eq!(shape, ResponseShape::LiteralDump);
        assert!(result.success);
        let elements = result.elements();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].text, "Login");
        assert_eq!((elements[1].center_x, elements[1].center_y), (Some(0.5), Some(0.6)));
    }

    #[test]
    fn test_json_encoded_literal_dump() {
        let inner = "{'success': True, 'data': {'parsed_content_list': 'Button ID 4: OK', 'label_coordinates': \"{'4': [np.float32(0.9), np.float32(0.1)]}\"}}";
        let body = serde_json::to_string(inner).unwrap();
        let (shape, result) = decode_body(&body, ShapePolicy::Auto).unwrap();
        assert_eq!(shape, ResponseShape::LiteralDump);
        assert_eq!(result.elements()[0].center_x, Some(0.9));
    }

    #[test]
    fn test_nested_json() {
        let body = json!({
            "success": true,
            "data": {
                "parsed_content_list": "Text Box ID 0: demo\nButton ID 1: Login",
                "label_coordinates": "{\"0\": [0.2, 0.3], \"1\": [0.5, 0.6]}"
            }
        })
        .to_string();
        let (shape, result) = decode_body(&body, ShapePolicy::Auto).unwrap();
        assert_eq!(shape, ResponseShape::NestedJson);
        let data = result.data.unwrap();
        assert_eq!(data.coordinate_map["1"], vec![0.5, 0.6]);
    }

    #[test]
    fn test_nested_json_with_bad_coordinates_keeps_text() {
        let body = json!({
            "success": true,
            "data": {"parsed_content_list": "Button ID 1: Login", "label_coordinates": "{broken"}
        })
        .to_string();
        let (_, result) = decode_body(&body, ShapePolicy::Auto).unwrap();
        let elements = result.elements();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].center_x, None);
    }

    #[test]
    fn test_element_list_with_bbox_and_centers() {
        let body = json!({
            "success": true,
            "data": {"parsed_content_list": [
                {"type": "text", "content": "Username", "bbox": [0.1, 0.2, 0.3, 0.4]},
                {"element_type": "Button", "text": "Login", "center_x": 0.5, "center_y": 0.6},
                {"type": "icon", "content": null}
            ]}
        })
        .to_string();
        let (shape, result) = decode_body(&body, ShapePolicy::Auto).unwrap();
        assert_eq!(shape, ResponseShape::ElementList);
        let elements = result.elements();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].element_type, "Text");
        assert!((elements[0].center_x.unwrap() - 0.2).abs() < 1e-9);
        assert!((elements[0].center_y.unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(elements[1].element_id, "1");
        assert_eq!(elements[1].center_y, Some(0.6));
        assert_eq!(elements[2].element_type, "Icon");
        assert_eq!(elements[2].center_x, None);
    }

    #[test]
    fn test_element_list_ids_stay_unique() {
        let body = json!({
            "success": true,
            "data": {"parsed_content_list": [
                {"type": "text", "content": "Username", "center_x": 0.1, "center_y": 0.1},
                {"id": 0, "type": "button", "content": "Login", "center_x": 0.5, "center_y": 0.6},
                {"id": "0", "type": "icon", "content": "Help", "center_x": 0.9, "center_y": 0.9},
                {"type": "text", "content": "Password", "center_x": 0.2, "center_y": 0.2}
            ]}
        })
        .to_string();
        let (_, result) = decode_body(&body, ShapePolicy::Auto).unwrap();
        let elements = result.elements();
        assert_eq!(elements.len(), 4);

        let ids: HashSet<&str> = elements.iter().map(|e| e.element_id.as_str()).collect();
        assert_eq!(ids.len(), 4);

        let by_text = |text: &str| elements.iter().find(|e| e.text == text).unwrap().clone();
        assert_eq!(by_text("Login").element_id, "0");
        assert_eq!(by_text("Username").element_id, "1");
        assert_eq!(by_text("Help").element_id, "2");
        assert_eq!(by_text("Password").element_id, "3");
        assert_eq!(by_text("Username").position().map(|p| (p.x, p.y)), Some((0.1, 0.1)));
        assert_eq!(by_text("Login").position().map(|p| (p.x, p.y)), Some((0.5, 0.6)));
        assert_eq!(by_text("Help").position().map(|p| (p.x, p.y)), Some((0.9, 0.9)));
    }

    #[test]
    fn test_upstream_failure_is_preserved() {
        let body = json!({"success": false, "error": "model not loaded"}).to_string();
        let (_, result) = decode_body(&body, ShapePolicy::Auto).unwrap();
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error.as_deref(), Some("model not loaded"));
    }

    #[test]
    fn test_unknown_shape_is_format_error() {
        let err = decode_body("<html>Bad Gateway</html>", ShapePolicy::Auto).unwrap_err();
        assert!(matches!(err, ParasightError::Format(_)));
        let err = decode_body(r#"{"status": "ok"}"#, ShapePolicy::Auto).unwrap_err();
        assert!(err.to_string().contains("nested_json, element_list, literal_dump"));
    }

    #[test]
    fn test_pinned_policy_rejects_other_shapes() {
        let body = json!({
            "success": true,
            "data": {"parsed_content_list": "Button ID 1: Login", "label_coordinates": {"1": [0.5, 0.6]}}
        })
        .to_string();
        assert!(decode_body(&body, ShapePolicy::ElementList).is_err());
        let (shape, _) = decode_body(&body, ShapePolicy::NestedJson).unwrap();
        assert_eq!(shape, ResponseShape::NestedJson);
    }
}
