//! Reconciliation pass

use crate::content::plan_content_update;
use crate::{DiscrepancyKind, ReconcileReport, ReconcilerConfig, ReconcilerError};
use chrono::Utc;
use quarry_acquire::quarantine;
use quarry_acquire::validate::check_pdf_file;
use quarry_domain::traits::{ContentStore, StateStore};
use quarry_domain::{
    ArtifactKind, ArtifactLayout, EngineProfile, ExtractedDocument, ItemId, Snapshot,
    SnapshotUpdate, Status,
};
use quarry_extractor::{prefer_higher_fidelity, Extractor, LenientProbe, ResultCheck};
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Converges the tracker, the artifact directories and the content database
///
/// The artifact directories are the system of record. A pass upgrades
/// tracker flags for valid artifacts, downgrades successes whose artifact is
/// gone or invalid, quarantines invalid files and fills the content
/// database. Running a pass twice without filesystem changes mutates nothing
/// the second time.
pub struct Reconciler<S, C>
where
    S: StateStore,
    C: ContentStore,
{
    config: ReconcilerConfig,
    store: Arc<S>,
    content: Option<Arc<C>>,
    extractor: Arc<Extractor>,
    lenient: Option<LenientProbe>,
}

impl<S, C> Reconciler<S, C>
where
    S: StateStore,
    C: ContentStore,
{
    /// Create a reconciler without a content database
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<S>,
        extractor: Arc<Extractor>,
    ) -> Result<Self, ReconcilerError> {
        config.validate().map_err(ReconcilerError::Config)?;
        let lenient = if config.lenient {
            extractor.lenient_probe()
        } else {
            None
        };
        Ok(Self {
            config,
            store,
            content: None,
            extractor,
            lenient,
        })
    }

    /// Attach the downstream content database
    pub fn with_content(mut self, content: Arc<C>) -> Self {
        self.content = Some(content);
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    fn layout(&self) -> &ArtifactLayout {
        self.extractor.layout()
    }

    /// Run one pass over every tracked item and every artifact on disk
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcilerError> {
        let started = std::time::Instant::now();
        let mut report = ReconcileReport::new(self.config.check_only);

        let known = self.store.list_ids().map_err(store_error)?;
        let stems: HashMap<String, ItemId> =
            known.iter().map(|id| (id.file_stem(), id.clone())).collect();

        let mut ids: BTreeSet<ItemId> = known.into_iter().collect();
        ids.extend(self.scan_raw(&stems)?);
        ids.extend(self.scan_results(&stems)?);

        let mut updates = Vec::new();
        for id in &ids {
            report.items_checked += 1;

            let snapshot = match self.store.get(id).map_err(store_error)? {
                Some(snapshot) => snapshot,
                None => {
                    self.found(&mut report, id, DiscrepancyKind::Untracked, None, "artifacts on disk but no tracker row");
                    Snapshot::new(id.clone(), Utc::now())
                }
            };

            let update = SnapshotUpdate::new(id.clone());
            let update = self.reconcile_raw(&snapshot, update, &mut report).await?;
            let (update, valid) = self.reconcile_results(&snapshot, update, &mut report)?;
            self.reconcile_content(id, valid, &mut report)?;

            if !update.is_empty() {
                updates.push(update);
            }
        }

        if !self.config.check_only && !updates.is_empty() {
            let applied = self.store.bulk_upsert(&updates).map_err(store_error)?;
            debug!(applied, "tracker updates written");
        }

        info!(
            items = report.items_checked,
            mutations = report.mutations(),
            discrepancies = report.discrepancies.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation pass finished"
        );
        Ok(report)
    }

    async fn reconcile_raw(
        &self,
        snapshot: &Snapshot,
        mut update: SnapshotUpdate,
        report: &mut ReconcileReport,
    ) -> Result<SnapshotUpdate, ReconcilerError> {
        let id = &snapshot.id;
        let path = self.layout().raw_path(id);

        let valid = if path.is_file() {
            match check_pdf_file(&path)? {
                Ok(()) => true,
                Err(reason) => {
                    if self.lenient_accepts(&path, &reason).await {
                        report.lenient_accepted += 1;
                        true
                    } else {
                        self.found(report, id, DiscrepancyKind::InvalidArtifact, Some(path.clone()), reason);
                        self.quarantine(id, &path, &ArtifactKind::Raw, report)?;
                        false
                    }
                }
            }
        } else {
            false
        };

        if valid && !snapshot.downloaded.is_success() {
            self.found(report, id, DiscrepancyKind::WrongStatus, Some(path), "raw artifact present but not marked downloaded");
            update = update.downloaded(Status::Success);
            self.upgraded(report, id, "downloaded");
        } else if !valid && snapshot.downloaded.is_success() {
            self.found(report, id, DiscrepancyKind::FalseSuccess, Some(path), "marked downloaded but raw artifact is missing or invalid");
            update = update.downloaded(Status::Unknown).download_source(None);
            for (name, state) in &snapshot.sources {
                if state.outcome.is_success() {
                    update = update.clear_source(name.clone());
                }
            }
            self.downgraded(report, id, "downloaded");
        }
        Ok(update)
    }

    fn reconcile_results(
        &self,
        snapshot: &Snapshot,
        mut update: SnapshotUpdate,
        report: &mut ReconcileReport,
    ) -> Result<(SnapshotUpdate, Vec<(EngineProfile, ExtractedDocument)>), ReconcilerError> {
        let id = &snapshot.id;
        let mut valid = Vec::new();

        for profile in self.layout().engines() {
            let name = profile.name.as_str();
            let Some(path) = self.layout().result_path(id, name) else {
                continue;
            };
            let status = snapshot.engine_status(name);

            match self.extractor.check_result_file(&path)? {
                ResultCheck::Valid(doc) => {
                    if !status.is_success() {
                        self.found(report, id, DiscrepancyKind::WrongStatus, Some(path), format!("valid {} result but status is {}", name, status.as_str()));
                        update = update.engine(name, Status::Success);
                        self.upgraded(report, id, name);
                    }
                    valid.push((profile.clone(), doc));
                }
                ResultCheck::Invalid(reason) => {
                    self.found(report, id, DiscrepancyKind::InvalidArtifact, Some(path.clone()), reason);
                    self.quarantine(id, &path, &ArtifactKind::Extracted(name.to_string()), report)?;
                    if status.is_success() {
                        update = update.engine(name, Status::Unknown);
                        self.downgraded(report, id, name);
                    }
                }
                ResultCheck::Missing => {
                    if status.is_success() {
                        self.found(report, id, DiscrepancyKind::FalseSuccess, Some(path), format!("{} marked success but result is missing", name));
                        update = update.engine(name, Status::Unknown);
                        self.downgraded(report, id, name);
                    }
                }
            }
        }

        if !valid.is_empty() && !snapshot.has_content.is_success() {
            self.found(report, id, DiscrepancyKind::WrongStatus, None, "valid result present but has_content not set");
            update = update.has_content(Status::Success);
            self.upgraded(report, id, "has_content");
        }
        Ok((update, valid))
    }

    fn reconcile_content(
        &self,
        id: &ItemId,
        valid: Vec<(EngineProfile, ExtractedDocument)>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcilerError> {
        if !self.config.update_content {
            return Ok(());
        }
        let Some(content) = &self.content else {
            return Ok(());
        };
        let Some((best, doc)) = prefer_higher_fidelity(valid) else {
            return Ok(());
        };

        let Some(record) = content.get(id).map_err(content_error)? else {
            report.not_in_content_db += 1;
            debug!(item = %id, "no content database row");
            return Ok(());
        };

        let plan = plan_content_update(&record, &best, &doc, self.layout().engines());
        if plan.is_empty() {
            return Ok(());
        }
        self.found(report, id, DiscrepancyKind::StaleContent, None, format!("content from {} not yet copied", best.name));
        if self.config.check_only {
            return Ok(());
        }

        if content.update(id, &plan).map_err(content_error)? {
            report.content_updated += 1;
            info!(item = %id, engine = %best.name, "content database updated");
        }
        Ok(())
    }

    async fn lenient_accepts(&self, path: &Path, reason: &str) -> bool {
        match &self.lenient {
            Some(probe) => probe.accepts(path, reason).await,
            None => false,
        }
    }

    fn quarantine(
        &self,
        id: &ItemId,
        path: &Path,
        kind: &ArtifactKind,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcilerError> {
        if self.config.check_only || !self.config.quarantine {
            return Ok(());
        }
        let dest = quarantine(path, &self.layout().quarantine_dir(kind))?;
        report.quarantined += 1;
        info!(item = %id, from = %path.display(), to = %dest.display(), "artifact quarantined");
        Ok(())
    }

    fn found(
        &self,
        report: &mut ReconcileReport,
        id: &ItemId,
        kind: DiscrepancyKind,
        path: Option<PathBuf>,
        detail: impl Into<String>,
    ) {
        let detail = detail.into();
        if self.config.check_only {
            info!(item = %id, kind = kind.as_str(), "{}", detail);
        }
        report.record(id, kind, path, detail);
    }

    fn upgraded(&self, report: &mut ReconcileReport, id: &ItemId, field: &str) {
        if !self.config.check_only {
            report.upgraded += 1;
            info!(item = %id, field, "upgraded to success");
        }
    }

    fn downgraded(&self, report: &mut ReconcileReport, id: &ItemId, field: &str) {
        if !self.config.check_only {
            report.downgraded += 1;
            info!(item = %id, field, "downgraded to unknown");
        }
    }

    fn scan_raw(&self, stems: &HashMap<String, ItemId>) -> Result<Vec<ItemId>, ReconcilerError> {
        let mut ids = Vec::new();
        for name in file_names(self.layout().raw_dir())? {
            if let Some(stem) = self.layout().parse_raw_name(&name) {
                ids.extend(resolve_stem(stem, stems));
            }
        }
        Ok(ids)
    }

    fn scan_results(&self, stems: &HashMap<String, ItemId>) -> Result<Vec<ItemId>, ReconcilerError> {
        let mut ids = Vec::new();
        for name in file_names(self.layout().output_dir())? {
            if let Some((stem, _)) = self.layout().parse_result_name(&name) {
                ids.extend(resolve_stem(stem, stems));
            }
        }
        Ok(ids)
    }
}

/// Map a file stem back to an item id, preferring ids the tracker knows
fn resolve_stem(stem: &str, known: &HashMap<String, ItemId>) -> Option<ItemId> {
    if let Some(id) = known.get(stem) {
        return Some(id.clone());
    }
    match ItemId::from_file_stem(stem) {
        Ok(id) => Some(id),
        Err(e) => {
            debug!(stem, error = %e, "skipping unmappable artifact name");
            None
        }
    }
}

/// Regular file names in `dir`; a missing directory is empty
fn file_names(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn store_error<E: std::fmt::Display>(e: E) -> ReconcilerError {
    ReconcilerError::Store(e.to_string())
}

fn content_error<E: std::fmt::Display>(e: E) -> ReconcilerError {
    ReconcilerError::Content(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_stem_prefers_known_ids() {
        let odd = ItemId::parse("10.1/a_b").unwrap();
        let known: HashMap<String, ItemId> = [(odd.file_stem(), odd.clone())].into();

        assert_eq!(resolve_stem("10.1_a_b", &known), Some(odd));
        assert_eq!(
            resolve_stem("10.2_c", &known),
            Some(ItemId::parse("10.2/c").unwrap())
        );
    }

    #[test]
    fn test_file_names_skips_directories_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("invalid_pdfs")).unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("a.pdf.part"), b"x").unwrap();

        let names = file_names(dir.path()).unwrap();
        assert_eq!(names, vec!["a.pdf.part".to_string(), "b.pdf".to_string()]);
        assert!(file_names(&dir.path().join("absent")).unwrap().is_empty());
    }
}
