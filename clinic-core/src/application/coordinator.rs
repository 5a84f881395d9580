//! Operations that span the relational store and the media host.
//!
//! The media host has no transactions, so every multi-step operation here
//! orders its calls so that the relational commit comes last and any
//! leftover on the remote side is an orphan rather than a dangling row.
//! Destroy failures never abort an operation; they are collected in a
//! [`CleanupReport`] and counted in [`ConsistencyMetrics`].

use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use clinic_model::{
    Patient, PatientDetails, PatientId, PatientVisits, StoredObject, Visit, VisitDetails, VisitId,
    VisitImage, VisitImageId, VisitWithImages,
};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{error, info, warn};

use super::unit_of_work::ClinicUnitOfWork;
use crate::consistency::{CleanupReport, ConsistencyMetrics, DestroyFailure};
use crate::database::ports::transaction::ClinicTransaction;
use crate::error::{ClinicError, Result};
use crate::media_store::{DestroyOutcome, MediaStore, MediaStoreError, is_destroyable};
use crate::validation::{require_image, validate_patient};

const CONSISTENCY: &str = "clinic.consistency";

/// Fan-out bounds for remote calls and composite reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub upload_concurrency: usize,
    pub destroy_concurrency: usize,
    pub read_concurrency: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            upload_concurrency: 4,
            destroy_concurrency: 4,
            read_concurrency: 8,
        }
    }
}

impl CoordinatorSettings {
    fn clamped(self) -> Self {
        Self {
            upload_concurrency: self.upload_concurrency.max(1),
            destroy_concurrency: self.destroy_concurrency.max(1),
            read_concurrency: self.read_concurrency.max(1),
        }
    }
}

#[derive(Clone)]
pub struct ClinicCoordinator {
    uow: ClinicUnitOfWork,
    media: Arc<dyn MediaStore>,
    metrics: Arc<ConsistencyMetrics>,
    settings: CoordinatorSettings,
}

impl fmt::Debug for ClinicCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClinicCoordinator")
            .field("uow", &self.uow)
            .field("media", &type_name_of_val(self.media.as_ref()))
            .field("metrics", &self.metrics.snapshot())
            .field("settings", &self.settings)
            .finish()
    }
}

enum CascadeRoot {
    Patient(PatientId),
    Visit(VisitId),
}

impl fmt::Display for CascadeRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient(id) => write!(f, "patient {id}"),
            Self::Visit(id) => write!(f, "visit {id}"),
        }
    }
}

impl ClinicCoordinator {
    pub fn new(
        uow: ClinicUnitOfWork,
        media: Arc<dyn MediaStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            uow,
            media,
            metrics: Arc::new(ConsistencyMetrics::new()),
            settings: settings.clamped(),
        }
    }

    pub fn metrics(&self) -> &Arc<ConsistencyMetrics> {
        &self.metrics
    }

    pub async fn create_patient(&self, details: &PatientDetails) -> Result<Patient> {
        let details = validate_patient(details)?;
        self.uow.patients.create(&details).await
    }

    pub async fn update_patient(
        &self,
        id: PatientId,
        details: &PatientDetails,
    ) -> Result<Option<Patient>> {
        let details = validate_patient(details)?;
        self.uow.patients.update(id, &details).await
    }

    /// Destroys every image object under the patient, then deletes the
    /// patient row and lets the schema cascade.
    pub async fn delete_patient(&self, id: PatientId) -> Result<CleanupReport> {
        self.cascade_delete(CascadeRoot::Patient(id)).await
    }

    pub async fn search_patients(&self, term: &str) -> Result<Vec<Patient>> {
        self.uow.patients.search_by_name(term.trim()).await
    }

    pub async fn get_patient_visits(&self, patient_id: PatientId) -> Result<PatientVisits> {
        let patient = self
            .uow
            .patients
            .get(patient_id)
            .await?
            .ok_or_else(|| ClinicError::not_found(format!("patient {patient_id}")))?;

        let visits = self.uow.visits.list_for_patient(patient_id).await?;
        let visits: Vec<VisitWithImages> = stream::iter(visits)
            .map(|visit| {
                let images = Arc::clone(&self.uow.visit_images);
                async move {
                    let images = images.list_for_visit(visit.id).await?;
                    Ok::<_, ClinicError>(VisitWithImages { visit, images })
                }
            })
            .buffered(self.settings.read_concurrency)
            .try_collect()
            .await?;

        Ok(PatientVisits { patient, visits })
    }

    /// Uploads every file first, then inserts the visit and all image rows
    /// in one transaction. Either every row lands or none does. The first
    /// failed upload stops the batch; uploads that succeeded before it are
    /// left on the host as orphans.
    pub async fn add_visit(
        &self,
        patient_id: PatientId,
        details: &VisitDetails,
        files: Vec<Bytes>,
    ) -> Result<VisitWithImages> {
        for file in &files {
            require_image(file)?;
        }
        if self.uow.patients.get(patient_id).await?.is_none() {
            return Err(ClinicError::not_found(format!("patient {patient_id}")));
        }

        // Once one upload fails no new upload starts; those already in
        // flight still finish so their objects are accounted for.
        let failed = Arc::new(AtomicBool::new(false));
        let results: Vec<Option<std::result::Result<StoredObject, MediaStoreError>>> =
            stream::iter(files)
                .map(|bytes| {
                    let media = Arc::clone(&self.media);
                    let failed = Arc::clone(&failed);
                    async move {
                        if failed.load(Ordering::SeqCst) {
                            return None;
                        }
                        let result = media.upload(bytes).await;
                        if result.is_err() {
                            failed.store(true, Ordering::SeqCst);
                        }
                        Some(result)
                    }
                })
                .buffered(self.settings.upload_concurrency)
                .collect()
                .await;

        let mut objects = Vec::with_capacity(results.len());
        let mut first_failure = None;
        for result in results.into_iter().flatten() {
            match result {
                Ok(object) => objects.push(object),
                Err(e) if first_failure.is_none() => first_failure = Some(e),
                Err(e) => warn!(target: CONSISTENCY, "additional upload failure: {e}"),
            }
        }

        if let Some(err) = first_failure {
            self.record_orphans(&objects, "visit upload batch failed");
            return Err(err.into());
        }

        match self.persist_visit(patient_id, details, &objects).await {
            Ok(visit) => {
                info!(
                    target: CONSISTENCY,
                    visit_id = %visit.visit.id,
                    images = visit.images.len(),
                    "visit created"
                );
                Ok(visit)
            }
            Err(e) => {
                self.record_orphans(&objects, "visit insert rolled back");
                Err(e)
            }
        }
    }

    async fn persist_visit(
        &self,
        patient_id: PatientId,
        details: &VisitDetails,
        objects: &[StoredObject],
    ) -> Result<VisitWithImages> {
        let mut tx = self.uow.transactions.begin().await?;
        let visit = tx.insert_visit(patient_id, details).await?;
        let mut images = Vec::with_capacity(objects.len());
        for object in objects {
            images.push(tx.insert_visit_image(visit.id, object).await?);
        }
        tx.commit().await?;
        Ok(VisitWithImages { visit, images })
    }

    pub async fn update_visit(&self, id: VisitId, details: &VisitDetails) -> Result<Visit> {
        self.uow
            .visits
            .update(id, details)
            .await?
            .ok_or_else(|| ClinicError::not_found(format!("visit {id}")))
    }

    /// Same protocol as [`ClinicCoordinator::delete_patient`], rooted at a
    /// single visit.
    pub async fn delete_visit(&self, id: VisitId) -> Result<CleanupReport> {
        self.cascade_delete(CascadeRoot::Visit(id)).await
    }

    /// Single insert, no transaction. An insert failure after the upload
    /// leaves the new object orphaned.
    pub async fn add_image_to_visit(&self, visit_id: VisitId, bytes: Bytes) -> Result<VisitImage> {
        require_image(&bytes)?;
        if self.uow.visits.get(visit_id).await?.is_none() {
            return Err(ClinicError::not_found(format!("visit {visit_id}")));
        }

        let object = self.media.upload(bytes).await?;
        match self.uow.visit_images.insert(visit_id, &object).await {
            Ok(image) => Ok(image),
            Err(e) => {
                self.record_orphans(std::slice::from_ref(&object), "image insert failed");
                Err(e)
            }
        }
    }

    /// Destroy the old object (best effort), upload the replacement, point
    /// the row at it.
    pub async fn update_visit_image(&self, id: VisitImageId, bytes: Bytes) -> Result<VisitImage> {
        require_image(&bytes)?;
        let existing = self
            .uow
            .visit_images
            .get(id)
            .await?
            .ok_or_else(|| ClinicError::not_found(format!("image {id}")))?;

        let old_gone = match self.media.destroy(&existing.object_id).await {
            Ok(DestroyOutcome::Destroyed | DestroyOutcome::NotFound) => true,
            Ok(DestroyOutcome::Skipped) => false,
            Err(e) => {
                warn!(
                    target: CONSISTENCY,
                    image_id = %id,
                    object_id = %existing.object_id,
                    "failed to destroy replaced object: {e}"
                );
                self.metrics.add_destroy_failures(1);
                false
            }
        };

        let object = match self.media.upload(bytes).await {
            Ok(object) => object,
            Err(e) => {
                if old_gone {
                    self.record_dangling(id, &existing.object_id, "replacement upload failed");
                }
                return Err(e.into());
            }
        };

        let outcome = self.uow.visit_images.replace_object(id, &object).await;
        match outcome {
            Ok(Some(image)) => Ok(image),
            Ok(None) => {
                self.record_orphans(std::slice::from_ref(&object), "image row vanished");
                Err(ClinicError::not_found(format!("image {id}")))
            }
            Err(e) => {
                self.record_orphans(std::slice::from_ref(&object), "image row update failed");
                if old_gone {
                    self.record_dangling(id, &existing.object_id, "image row update failed");
                }
                Err(e)
            }
        }
    }

    /// Destroy the remote object (best effort), then delete the row.
    pub async fn delete_visit_image(&self, id: VisitImageId) -> Result<CleanupReport> {
        let existing = self
            .uow
            .visit_images
            .get(id)
            .await?
            .ok_or_else(|| ClinicError::not_found(format!("image {id}")))?;

        let object_ids = [existing.object_id];
        let report = self.destroy_all(&object_ids).await;

        match self.uow.visit_images.delete(id).await {
            Ok(_) => Ok(report),
            Err(e) => {
                let removed = removed_ids(&object_ids, &report);
                if removed.is_empty() {
                    return Err(e);
                }
                self.record_dangling(id, &removed.join(", "), "image row delete failed");
                Err(ClinicError::Inconsistent {
                    reason: e.to_string(),
                    object_ids: removed,
                })
            }
        }
    }

    async fn cascade_delete(&self, root: CascadeRoot) -> Result<CleanupReport> {
        let mut tx = self.uow.transactions.begin().await?;
        let locked = match &root {
            CascadeRoot::Patient(id) => tx.lock_patient_objects(*id).await?,
            CascadeRoot::Visit(id) => tx.lock_visit_objects(*id).await?,
        };
        let Some(object_ids) = locked else {
            tx.rollback().await?;
            return Err(ClinicError::not_found(root.to_string()));
        };

        let report = self.destroy_all(&object_ids).await;

        match Self::delete_and_commit(tx, &root).await {
            Ok(true) => {
                info!(
                    target: CONSISTENCY,
                    root = %root,
                    attempted = report.attempted,
                    removed = report.removed_count(),
                    failures = report.failures.len(),
                    "cascade delete committed"
                );
                Ok(report)
            }
            Ok(false) => Err(ClinicError::not_found(root.to_string())),
            Err(e) => {
                let removed = removed_ids(&object_ids, &report);
                if removed.is_empty() {
                    return Err(e);
                }
                self.metrics.add_inconsistent_commit();
                error!(
                    target: CONSISTENCY,
                    root = %root,
                    objects = ?removed,
                    "rows kept after their remote objects were destroyed: {e}"
                );
                Err(ClinicError::Inconsistent {
                    reason: e.to_string(),
                    object_ids: removed,
                })
            }
        }
    }

    /// Returns `false` when the root row was already gone; nothing is
    /// committed in that case.
    async fn delete_and_commit(
        mut tx: Box<dyn ClinicTransaction>,
        root: &CascadeRoot,
    ) -> Result<bool> {
        let deleted = match root {
            CascadeRoot::Patient(id) => tx.delete_patient(*id).await?,
            CascadeRoot::Visit(id) => tx.delete_visit(*id).await?,
        };
        if !deleted {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn destroy_all(&self, object_ids: &[String]) -> CleanupReport {
        let targets: Vec<String> = object_ids
            .iter()
            .filter(|id| is_destroyable(id))
            .cloned()
            .collect();
        let outcomes: Vec<(String, _)> = stream::iter(targets)
            .map(|object_id| {
                let media = Arc::clone(&self.media);
                async move {
                    let outcome = media.destroy(&object_id).await;
                    (object_id, outcome)
                }
            })
            .buffer_unordered(self.settings.destroy_concurrency)
            .collect()
            .await;

        let mut report = CleanupReport::default();
        for (object_id, outcome) in outcomes {
            match outcome {
                Ok(DestroyOutcome::Skipped) => {}
                Ok(DestroyOutcome::Destroyed) => {
                    report.attempted += 1;
                    report.destroyed += 1;
                }
                Ok(DestroyOutcome::NotFound) => {
                    report.attempted += 1;
                    report.missing += 1;
                }
                Err(e) => {
                    report.attempted += 1;
                    warn!(
                        target: CONSISTENCY,
                        object_id = %object_id,
                        "destroy failed, object left on the media host: {e}"
                    );
                    report.failures.push(DestroyFailure {
                        object_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.metrics.record_cleanup(&report);
        report
    }

    fn record_orphans(&self, objects: &[StoredObject], reason: &str) {
        if objects.is_empty() {
            return;
        }
        let ids: Vec<&str> = objects.iter().map(|o| o.object_id.as_str()).collect();
        warn!(target: CONSISTENCY, objects = ?ids, "orphaned uploads: {reason}");
        self.metrics.add_orphaned_uploads(objects.len() as u64);
    }

    fn record_dangling(&self, image_id: VisitImageId, object_id: &str, reason: &str) {
        error!(
            target: CONSISTENCY,
            image_id = %image_id,
            object_id = %object_id,
            "image row references a destroyed object: {reason}"
        );
        self.metrics.add_dangling_reference();
    }
}

/// Ids from `object_ids` that the report did not list as failures.
fn removed_ids(object_ids: &[String], report: &CleanupReport) -> Vec<String> {
    object_ids
        .iter()
        .filter(|id| is_destroyable(id))
        .filter(|id| !report.failures.iter().any(|f| &f.object_id == *id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::testing::{
        MemoryClinicStore, ScriptedMediaStore, in_memory_coordinator, in_memory_coordinator_with,
    };

    fn assert_send<T: Send>(_: &T) {}

    fn ali() -> PatientDetails {
        PatientDetails {
            name: "Ali".into(),
            age: 30,
            gender: "M".into(),
        }
    }

    fn checkup(day: u32) -> VisitDetails {
        VisitDetails {
            visit_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            reason: "checkup".into(),
        }
    }

    fn file(tag: &str) -> Bytes {
        Bytes::from(tag.as_bytes().to_vec())
    }

    async fn seeded(
        visits: usize,
        images_per_visit: usize,
    ) -> (
        ClinicCoordinator,
        Arc<MemoryClinicStore>,
        Arc<ScriptedMediaStore>,
        Patient,
    ) {
        let (coordinator, store, media) = in_memory_coordinator();
        let patient = coordinator.create_patient(&ali()).await.unwrap();
        for v in 0..visits {
            let files = (0..images_per_visit)
                .map(|i| file(&format!("v{v}-i{i}")))
                .collect();
            coordinator
                .add_visit(patient.id, &checkup(v as u32 + 1), files)
                .await
                .unwrap();
        }
        (coordinator, store, media, patient)
    }

    #[tokio::test]
    async fn scenario_create_visit_then_delete_patient() {
        let (coordinator, store, media, patient) = seeded(0, 0).await;

        let visit = coordinator
            .add_visit(patient.id, &checkup(1), vec![file("imgA")])
            .await
            .unwrap();
        assert_eq!(store.visit_count(), 1);
        assert_eq!(visit.images.len(), 1);
        let object_id = visit.images[0].object_id.clone();
        assert!(!object_id.is_empty());
        assert!(visit.images[0].image_url.starts_with("https://"));

        let report = coordinator.delete_patient(patient.id).await.unwrap();

        assert_eq!(media.destroy_calls(), vec![object_id]);
        assert_eq!(report.destroyed, 1);
        assert_eq!(store.patient_count(), 0);
        assert_eq!(store.visit_count(), 0);
        assert_eq!(store.image_count(), 0);
        assert!(media.live_objects().is_empty());
    }

    #[tokio::test]
    async fn delete_patient_attempts_every_descendant_object() {
        let (coordinator, store, media, patient) = seeded(3, 2).await;
        assert_eq!(store.image_count(), 6);
        media.fail_all_destroys();

        let report = coordinator.delete_patient(patient.id).await.unwrap();

        assert_eq!(media.destroy_calls().len(), 6);
        assert_eq!(report.attempted, 6);
        assert_eq!(report.failures.len(), 6);
        assert_eq!(store.patient_count(), 0);
        assert_eq!(store.visit_count(), 0);
        assert_eq!(store.image_count(), 0);
        assert_eq!(coordinator.metrics().snapshot().destroy_failures, 6);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn partial_destroy_failure_does_not_block_delete() {
        let (coordinator, store, media, patient) = seeded(1, 2).await;
        let first = media.live_objects()[0].clone();
        media.fail_destroy_of(first.clone());

        let report = coordinator.delete_patient(patient.id).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.destroyed, 1);
        assert_eq!(report.failures[0].object_id, first);
        assert_eq!(store.patient_count(), 0);
        assert_eq!(media.live_objects(), vec![first]);
    }

    #[tokio::test]
    async fn commit_failure_after_destroys_is_inconsistent() {
        let (coordinator, store, media, patient) = seeded(1, 1).await;
        let object_id = media.live_objects()[0].clone();
        store.fail_commits(true);

        let err = coordinator.delete_patient(patient.id).await.unwrap_err();

        match err {
            ClinicError::Inconsistent { object_ids, .. } => {
                assert_eq!(object_ids, vec![object_id]);
            }
            other => panic!("expected inconsistency, got {other:?}"),
        }
        assert_eq!(store.patient_count(), 1);
        assert_eq!(store.image_count(), 1);
        assert_eq!(coordinator.metrics().snapshot().inconsistent_commits, 1);
    }

    #[tokio::test]
    async fn commit_failure_without_destroys_is_plain_persistence_error() {
        let (coordinator, store, _media, patient) = seeded(1, 0).await;
        store.fail_commits(true);

        let err = coordinator.delete_patient(patient.id).await.unwrap_err();

        assert!(matches!(err, ClinicError::Persistence(_)));
        assert_eq!(store.visit_count(), 1);
        assert_eq!(coordinator.metrics().snapshot().inconsistent_commits, 0);
    }

    #[tokio::test]
    async fn deleting_missing_patient_or_visit_touches_nothing_remote() {
        let (coordinator, _store, media) = in_memory_coordinator();

        assert!(matches!(
            coordinator.delete_patient(PatientId::new()).await,
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(
            coordinator.delete_visit(VisitId::new()).await,
            Err(ClinicError::NotFound(_))
        ));
        assert_eq!(media.total_calls(), 0);
    }

    fn serial_uploads() -> CoordinatorSettings {
        CoordinatorSettings {
            upload_concurrency: 1,
            ..CoordinatorSettings::default()
        }
    }

    #[tokio::test]
    async fn add_visit_failure_leaves_no_rows_and_orphans_successes() {
        let (coordinator, store, media) = in_memory_coordinator_with(serial_uploads());
        let patient = coordinator.create_patient(&ali()).await.unwrap();
        media.fail_upload_of("second");

        let err = coordinator
            .add_visit(patient.id, &checkup(1), vec![file("first"), file("second")])
            .await
            .unwrap_err();

        assert!(matches!(err, ClinicError::Upload(_)));
        assert_eq!(store.visit_count(), 0);
        assert_eq!(store.image_count(), 0);
        assert_eq!(media.upload_calls(), 2);
        assert_eq!(media.live_objects().len(), 1);
        assert!(media.destroy_calls().is_empty());
        assert_eq!(coordinator.metrics().snapshot().orphaned_uploads, 1);
    }

    #[tokio::test]
    async fn add_visit_stops_uploading_after_the_first_failure() {
        let (coordinator, store, media) = in_memory_coordinator_with(serial_uploads());
        let patient = coordinator.create_patient(&ali()).await.unwrap();
        media.fail_upload_of("bad");

        let err = coordinator
            .add_visit(
                patient.id,
                &checkup(1),
                vec![file("bad"), file("a"), file("b"), file("c")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ClinicError::Upload(_)));
        assert_eq!(media.upload_calls(), 1);
        assert!(media.live_objects().is_empty());
        assert_eq!(coordinator.metrics().snapshot().orphaned_uploads, 0);
        assert_eq!(store.visit_count(), 0);
    }

    #[tokio::test]
    async fn add_visit_insert_failure_rolls_back_the_visit() {
        let (coordinator, store, media, patient) = seeded(0, 0).await;
        store.fail_image_insert_number(3);

        let result = coordinator
            .add_visit(
                patient.id,
                &checkup(1),
                vec![file("a"), file("b"), file("c")],
            )
            .await;

        assert!(matches!(result, Err(ClinicError::Persistence(_))));
        assert_eq!(store.visit_count(), 0);
        assert_eq!(store.image_count(), 0);
        assert_eq!(media.live_objects().len(), 3);
        assert_eq!(coordinator.metrics().snapshot().orphaned_uploads, 3);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn add_visit_with_all_uploads_lands_every_row_in_order() {
        let (coordinator, store, _media, patient) = seeded(0, 0).await;

        let visit = coordinator
            .add_visit(patient.id, &checkup(1), vec![file("a"), file("b"), file("c")])
            .await
            .unwrap();

        assert_eq!(store.visit_count(), 1);
        assert_eq!(store.image_count(), 3);
        let ids: Vec<_> = visit.images.iter().map(|i| i.object_id.as_str()).collect();
        assert_eq!(
            ids,
            ["clinic_images/obj-1", "clinic_images/obj-2", "clinic_images/obj-3"]
        );
    }

    #[tokio::test]
    async fn add_visit_without_files_and_for_unknown_patient() {
        let (coordinator, store, media, patient) = seeded(0, 0).await;

        let visit = coordinator
            .add_visit(patient.id, &checkup(1), Vec::new())
            .await
            .unwrap();
        assert!(visit.images.is_empty());
        assert_eq!(store.visit_count(), 1);

        let missing = coordinator
            .add_visit(PatientId::new(), &checkup(1), vec![file("x")])
            .await;
        assert!(matches!(missing, Err(ClinicError::NotFound(_))));
        assert_eq!(media.upload_calls(), 0);
    }

    #[tokio::test]
    async fn delete_visit_destroys_its_objects_only() {
        let (coordinator, store, media, patient) = seeded(2, 1).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let target = &visits.visits[0];
        let target_object = target.images[0].object_id.clone();

        let report = coordinator.delete_visit(target.visit.id).await.unwrap();

        assert_eq!(report.destroyed, 1);
        assert_eq!(media.destroy_calls(), vec![target_object]);
        assert_eq!(store.visit_count(), 1);
        assert_eq!(store.image_count(), 1);
    }

    #[tokio::test]
    async fn delete_visit_commit_failure_is_inconsistent() {
        let (coordinator, store, media, patient) = seeded(1, 2).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let visit_id = visits.visits[0].visit.id;
        store.fail_commits(true);

        let err = coordinator.delete_visit(visit_id).await.unwrap_err();

        match err {
            ClinicError::Inconsistent { object_ids, .. } => assert_eq!(object_ids.len(), 2),
            other => panic!("expected inconsistency, got {other:?}"),
        }
        assert_eq!(store.visit_count(), 1);
        assert_eq!(store.image_count(), 2);
        assert!(media.live_objects().is_empty());
        assert_eq!(coordinator.metrics().snapshot().inconsistent_commits, 1);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn add_image_insert_failure_orphans_the_upload() {
        let (coordinator, store, media, patient) = seeded(1, 0).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        store.fail_image_inserts(true);

        let result = coordinator
            .add_image_to_visit(visits.visits[0].visit.id, file("single"))
            .await;

        assert!(matches!(result, Err(ClinicError::Persistence(_))));
        assert_eq!(store.image_count(), 0);
        assert_eq!(media.live_objects().len(), 1);
        assert_eq!(coordinator.metrics().snapshot().orphaned_uploads, 1);
    }

    #[tokio::test]
    async fn delete_visit_image_row_failure_after_destroy_is_inconsistent() {
        let (coordinator, store, media, patient) = seeded(1, 1).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let image = visits.visits[0].images[0].clone();
        store.fail_image_deletes(true);

        let err = coordinator.delete_visit_image(image.id).await.unwrap_err();

        match err {
            ClinicError::Inconsistent { object_ids, .. } => {
                assert_eq!(object_ids, vec![image.object_id.clone()]);
            }
            other => panic!("expected inconsistency, got {other:?}"),
        }
        assert_eq!(store.image(image.id), Some(image.clone()));
        assert!(!media.is_live(&image.object_id));
        assert_eq!(coordinator.metrics().snapshot().dangling_references, 1);
    }

    #[tokio::test]
    async fn operation_futures_are_send() {
        let (coordinator, _store, _media) = in_memory_coordinator();

        assert_send(&coordinator.delete_patient(PatientId::new()));
        assert_send(&coordinator.delete_visit(VisitId::new()));
        assert_send(&coordinator.delete_visit_image(VisitImageId::new()));
        assert_send(&coordinator.get_patient_visits(PatientId::new()));
        assert_send(&coordinator.add_visit(PatientId::new(), &checkup(1), Vec::new()));
        assert_send(&coordinator.update_visit_image(VisitImageId::new(), file("x")));
        assert_send(&coordinator.add_image_to_visit(VisitId::new(), file("x")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deletes_on_worker_threads() {
        let (coordinator, store, media) = in_memory_coordinator();
        let mut handles = Vec::new();
        for n in 0..8 {
            let patient = coordinator.create_patient(&ali()).await.unwrap();
            coordinator
                .add_visit(patient.id, &checkup(1), vec![file(&format!("p{n}"))])
                .await
                .unwrap();
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.delete_patient(patient.id).await
            }));
        }

        for handle in handles {
            let report = handle.await.unwrap().unwrap();
            assert_eq!(report.destroyed, 1);
        }
        assert_eq!(store.patient_count(), 0);
        assert_eq!(store.image_count(), 0);
        assert!(media.live_objects().is_empty());
    }

    #[tokio::test]
    async fn update_visit_image_replaces_url() {
        let (coordinator, store, media, patient) = seeded(1, 1).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let before = visits.visits[0].images[0].clone();

        let after = coordinator
            .update_visit_image(before.id, file("replacement"))
            .await
            .unwrap();

        assert_eq!(after.id, before.id);
        assert_ne!(after.image_url, before.image_url);
        assert_eq!(store.image_count(), 1);
        assert!(!media.is_live(&before.object_id));
        assert!(media.is_live(&after.object_id));
    }

    #[tokio::test]
    async fn update_visit_image_proceeds_when_old_destroy_fails() {
        let (coordinator, store, media, patient) = seeded(1, 1).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let before = visits.visits[0].images[0].clone();
        media.fail_destroy_of(before.object_id.clone());

        let after = coordinator
            .update_visit_image(before.id, file("replacement"))
            .await
            .unwrap();

        assert_ne!(after.image_url, before.image_url);
        assert_eq!(store.image(before.id), Some(after));
        assert_eq!(coordinator.metrics().snapshot().destroy_failures, 1);
    }

    #[tokio::test]
    async fn update_visit_image_counts_dangling_when_upload_fails() {
        let (coordinator, store, media, patient) = seeded(1, 1).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let before = visits.visits[0].images[0].clone();
        media.fail_upload_of("replacement");

        let err = coordinator
            .update_visit_image(before.id, file("replacement"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClinicError::Upload(_)));
        assert_eq!(store.image(before.id), Some(before));
        assert_eq!(coordinator.metrics().snapshot().dangling_references, 1);
    }

    #[tokio::test]
    async fn update_visit_image_counts_orphan_when_row_update_fails() {
        let (coordinator, store, _media, patient) = seeded(1, 1).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let image_id = visits.visits[0].images[0].id;
        store.fail_image_updates(true);

        let result = coordinator
            .update_visit_image(image_id, file("replacement"))
            .await;

        assert!(matches!(result, Err(ClinicError::Persistence(_))));
        let snapshot = coordinator.metrics().snapshot();
        assert_eq!(snapshot.orphaned_uploads, 1);
        assert_eq!(snapshot.dangling_references, 1);
    }

    #[tokio::test]
    async fn image_operations_on_missing_rows_make_no_remote_calls() {
        let (coordinator, _store, media) = in_memory_coordinator();

        assert!(matches!(
            coordinator.delete_visit_image(VisitImageId::new()).await,
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(
            coordinator
                .update_visit_image(VisitImageId::new(), file("x"))
                .await,
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(
            coordinator
                .add_image_to_visit(VisitId::new(), file("x"))
                .await,
            Err(ClinicError::NotFound(_))
        ));
        assert_eq!(media.total_calls(), 0);
    }

    #[tokio::test]
    async fn delete_visit_image_removes_both_halves() {
        let (coordinator, store, media, patient) = seeded(1, 0).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let image = coordinator
            .add_image_to_visit(visits.visits[0].visit.id, file("single"))
            .await
            .unwrap();
        assert_eq!(store.image_count(), 1);

        let report = coordinator.delete_visit_image(image.id).await.unwrap();

        assert_eq!(report.destroyed, 1);
        assert_eq!(store.image_count(), 0);
        assert!(!media.is_live(&image.object_id));
    }

    #[tokio::test]
    async fn delete_visit_image_ignores_destroy_failure() {
        let (coordinator, store, media, patient) = seeded(1, 1).await;
        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let image = visits.visits[0].images[0].clone();
        media.fail_destroy_of(image.object_id.clone());

        let report = coordinator.delete_visit_image(image.id).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.image_count(), 0);
        assert!(media.is_live(&image.object_id));
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_sorted() {
        let (coordinator, _store, _media) = in_memory_coordinator();
        for name in ["Salim", "KHALID", "Ali", "Aliya", "Bob"] {
            coordinator
                .create_patient(&PatientDetails {
                    name: name.into(),
                    ..ali()
                })
                .await
                .unwrap();
        }

        let names: Vec<String> = coordinator
            .search_patients("ali")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();

        assert_eq!(names, ["Ali", "Aliya", "KHALID", "Salim"]);
    }

    #[tokio::test]
    async fn patient_visits_are_newest_first_with_images() {
        let (coordinator, _store, _media, patient) = seeded(3, 1).await;

        let composite = coordinator.get_patient_visits(patient.id).await.unwrap();

        let days: Vec<u32> = composite
            .visits
            .iter()
            .map(|v| chrono::Datelike::day(&v.visit.visit_date))
            .collect();
        assert_eq!(days, [3, 2, 1]);
        assert!(composite.visits.iter().all(|v| v.images.len() == 1));
        assert!(matches!(
            coordinator.get_patient_visits(PatientId::new()).await,
            Err(ClinicError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_patient_and_visit() {
        let (coordinator, _store, _media, patient) = seeded(1, 0).await;

        let updated = coordinator
            .update_patient(
                patient.id,
                &PatientDetails {
                    age: 31,
                    ..ali()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.age, 31);
        assert!(
            coordinator
                .update_patient(PatientId::new(), &ali())
                .await
                .unwrap()
                .is_none()
        );

        let visits = coordinator.get_patient_visits(patient.id).await.unwrap();
        let visit = coordinator
            .update_visit(visits.visits[0].visit.id, &checkup(9))
            .await
            .unwrap();
        assert_eq!(visit.patient_id, patient.id);
        assert_eq!(visit.visit_date, checkup(9).visit_date);
        assert!(matches!(
            coordinator.update_visit(VisitId::new(), &checkup(9)).await,
            Err(ClinicError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn patient_names_are_stored_trimmed() {
        let (coordinator, _store, _media) = in_memory_coordinator();

        let patient = coordinator
            .create_patient(&PatientDetails {
                name: format!("Ali{}", " ".repeat(200)),
                ..ali()
            })
            .await
            .unwrap();

        assert_eq!(patient.name, "Ali");
    }

    #[tokio::test]
    async fn invalid_patient_is_rejected_before_storage() {
        let (coordinator, store, _media) = in_memory_coordinator();

        let result = coordinator
            .create_patient(&PatientDetails {
                name: " ".into(),
                ..ali()
            })
            .await;

        assert!(matches!(result, Err(ClinicError::InvalidInput(_))));
        assert_eq!(store.patient_count(), 0);
    }
}
