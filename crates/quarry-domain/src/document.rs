//! Normalized extraction result

use serde::{Deserialize, Serialize};

/// One `(heading, text)` pair of an extracted document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section heading
    pub heading: String,

    /// Section body
    pub text: String,
}

impl Section {
    /// Create a section
    pub fn new(heading: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            text: text.into(),
        }
    }
}

/// Engine output normalized to `{title?, abstract?, sections}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Document title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Abstract
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    /// Ordered body sections
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl ExtractedDocument {
    /// Sections whose body is not blank
    pub fn non_empty_sections(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .count()
    }

    /// Characters of trimmed section text plus the abstract
    pub fn char_count(&self) -> usize {
        let body: usize = self.sections.iter().map(|s| s.text.trim().chars().count()).sum();
        let abstract_len = self
            .abstract_text
            .as_deref()
            .map(|a| a.trim().chars().count())
            .unwrap_or(0);
        body + abstract_len
    }

    /// Sections as a JSON object `{heading: text}`
    ///
    /// Repeated headings are joined with a blank line, matching how the
    /// content database stores full text.
    pub fn sections_json(&self) -> String {
        let mut map = serde_json::Map::new();
        for section in &self.sections {
            let heading = if section.heading.trim().is_empty() {
                "Unnamed Section".to_string()
            } else {
                section.heading.clone()
            };
            let merged = match map.remove(&heading) {
                Some(serde_json::Value::String(existing)) => format!("{}\n\n{}", existing, section.text),
                _ => section.text.clone(),
            };
            map.insert(heading, serde_json::Value::String(merged));
        }
        serde_json::Value::Object(map).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let doc = ExtractedDocument {
            title: Some("T".into()),
            abstract_text: Some(" abc ".into()),
            sections: vec![Section::new("Intro", "hello"), Section::new("Empty", "   ")],
        };
        assert_eq!(doc.non_empty_sections(), 1);
        assert_eq!(doc.char_count(), 8);
    }

    #[test]
    fn test_sections_json_merges_duplicates() {
        let doc = ExtractedDocument {
            sections: vec![
                Section::new("Methods", "a"),
                Section::new("", "b"),
                Section::new("Methods", "c"),
            ],
            ..Default::default()
        };
        let value: serde_json::Value = serde_json::from_str(&doc.sections_json()).unwrap();
        assert_eq!(value["Methods"], "a\n\nc");
        assert_eq!(value["Unnamed Section"], "b");
    }

    #[test]
    fn test_abstract_field_name() {
        let doc: ExtractedDocument =
            serde_json::from_str(r#"{"abstract": "x", "sections": []}"#).unwrap();
        assert_eq!(doc.abstract_text.as_deref(), Some("x"));
    }
}
