//! Parse engine output into normalized documents
//!
//! Three layouts are recognized:
//!
//! - normalized: `{title, abstract, sections: [{heading, text}]}`
//! - high-fidelity legacy: `metadata.{title, abstract}` plus
//!   `full_text.body: [{title, content}]`
//! - fast legacy: `structured_text.sections: [{title, content}]`

use crate::error::ExtractorError;
use quarry_domain::{ExtractedDocument, Section};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Parse a JSON document in any accepted layout
pub fn parse_document(raw: &str) -> Result<ExtractedDocument, ExtractorError> {
    let json: Value = serde_json::from_str(raw.trim())?;
    let obj = json
        .as_object()
        .ok_or_else(|| ExtractorError::Parse("expected a JSON object".to_string()))?;

    if obj.get("sections").is_some_and(Value::is_array) {
        return Ok(serde_json::from_value(json)?);
    }

    if let Some(body) = obj
        .get("full_text")
        .and_then(|f| f.get("body"))
        .and_then(Value::as_array)
    {
        debug!("parsing high-fidelity legacy layout");
        let metadata = obj.get("metadata").and_then(Value::as_object);
        return Ok(ExtractedDocument {
            title: metadata.and_then(|m| text_field(m, "title")),
            abstract_text: metadata
                .and_then(|m| text_field(m, "abstract"))
                .or_else(|| text_field(obj, "abstract")),
            sections: legacy_sections(body),
        });
    }

    if let Some(sections) = obj
        .get("structured_text")
        .and_then(|s| s.get("sections"))
        .and_then(Value::as_array)
    {
        debug!("parsing fast legacy layout");
        let metadata = obj.get("metadata").and_then(Value::as_object);
        return Ok(ExtractedDocument {
            title: metadata
                .and_then(|m| text_field(m, "title"))
                .or_else(|| text_field(obj, "title")),
            abstract_text: metadata
                .and_then(|m| text_field(m, "abstract"))
                .or_else(|| text_field(obj, "abstract")),
            sections: legacy_sections(sections),
        });
    }

    Err(ExtractorError::Parse(
        "no sections, full_text.body or structured_text.sections found".to_string(),
    ))
}

/// Read and parse a result file
pub fn read_document(path: &Path) -> Result<ExtractedDocument, ExtractorError> {
    let raw = std::fs::read_to_string(path)?;
    parse_document(&raw)
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn legacy_sections(items: &[Value]) -> Vec<Section> {
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|item| {
            Section::new(
                text_field(item, "title")
                    .or_else(|| text_field(item, "heading"))
                    .unwrap_or_default(),
                text_field(item, "content")
                    .or_else(|| text_field(item, "text"))
                    .unwrap_or_default(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalized() {
        let doc = parse_document(
            r#"{"title": "T", "abstract": "A", "sections": [{"heading": "Intro", "text": "hello"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.title.as_deref(), Some("T"));
        assert_eq!(doc.abstract_text.as_deref(), Some("A"));
        assert_eq!(doc.sections, vec![Section::new("Intro", "hello")]);
    }

    #[test]
    fn test_parse_high_fidelity_layout() {
        let doc = parse_document(
            r#"{
                "metadata": {"title": "Deep Things", "abstract": "We study things."},
                "full_text": {"body": [
                    {"title": "Introduction", "content": "Things are deep."},
                    {"title": "", "content": "Untitled body."}
                ]}
            }"#,
        )
        .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Deep Things"));
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[1].heading, "");
    }

    #[test]
    fn test_parse_fast_layout() {
        let doc = parse_document(
            r#"{"structured_text": {"sections": [{"title": "Page 1", "content": "text"}]}}"#,
        )
        .unwrap();
        assert!(doc.title.is_none());
        assert_eq!(doc.sections[0].text, "text");
    }

    #[test]
    fn test_parse_rejects_unknown_layout() {
        assert!(matches!(
            parse_document(r#"{"pages": []}"#),
            Err(ExtractorError::Parse(_))
        ));
        assert!(matches!(parse_document("not json"), Err(ExtractorError::Parse(_))));
        assert!(matches!(parse_document("[1, 2]"), Err(ExtractorError::Parse(_))));
    }
}
