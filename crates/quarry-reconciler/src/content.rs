//! Content database update policy

use quarry_domain::traits::{ContentRecord, ContentUpdate};
use quarry_domain::{EngineProfile, ExtractedDocument};

/// Decide what to write to a content row given the best extracted result
///
/// Empty fields are filled. Non-empty sections are replaced only when the
/// row's parsing status names a lower-fidelity engine and does not name
/// `best` yet. A status that already names `best` is never rewritten.
pub fn plan_content_update(
    record: &ContentRecord,
    best: &EngineProfile,
    doc: &ExtractedDocument,
    profiles: &[EngineProfile],
) -> ContentUpdate {
    let status = record.parsing_status.as_deref().unwrap_or("").trim();
    let names_best = names_engine(status, &best.name);
    let mut update = ContentUpdate::default();

    let doc_abstract = doc
        .abstract_text
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());
    let doc_has_sections = doc.non_empty_sections() > 0;

    let current = profiles
        .iter()
        .filter(|p| names_engine(status, &p.name))
        .map(|p| p.fidelity)
        .max();
    let overrides = !names_best
        && !record.sections_are_empty()
        && doc_has_sections
        && current.is_some_and(|fidelity| best.fidelity > fidelity);

    if overrides {
        update.sections = Some(non_empty_sections(doc));
        if let Some(text) = doc_abstract {
            update.abstract_text = Some(text.to_string());
        }
        update.parsing_status = Some(format!("{} | {}: success", status, best.name));
        return update;
    }

    if record.abstract_is_empty() {
        if let Some(text) = doc_abstract {
            update.abstract_text = Some(text.to_string());
        }
    }
    if record.sections_are_empty() && doc_has_sections {
        update.sections = Some(non_empty_sections(doc));
        if !names_best {
            update.parsing_status = Some(if current.is_none() {
                format!("success (parser: {})", best.name)
            } else {
                format!("{} | {}: success", status, best.name)
            });
        }
    }
    update
}

fn non_empty_sections(doc: &ExtractedDocument) -> Vec<quarry_domain::Section> {
    doc.sections
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .cloned()
        .collect()
}

/// Whether `status` mentions `engine` as a whole word
fn names_engine(status: &str, engine: &str) -> bool {
    status
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .any(|word| word.eq_ignore_ascii_case(engine))
}
