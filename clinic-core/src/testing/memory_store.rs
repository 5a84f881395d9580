use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use clinic_model::{
    Patient, PatientDetails, PatientId, StoredObject, Visit, VisitDetails, VisitId, VisitImage,
    VisitImageId,
};
use parking_lot::Mutex;

use crate::database::ports::{
    patients::PatientsRepository,
    transaction::{ClinicTransaction, TransactionalStore},
    visit_images::VisitImagesRepository,
    visits::VisitsRepository,
};
use crate::error::{ClinicError, Result};

#[derive(Debug, Clone, Default)]
struct Tables {
    patients: BTreeMap<PatientId, Patient>,
    visits: BTreeMap<VisitId, Visit>,
    images: BTreeMap<VisitImageId, VisitImage>,
}

impl Tables {
    fn remove_patient(&mut self, id: PatientId) -> bool {
        if self.patients.remove(&id).is_none() {
            return false;
        }
        let visit_ids: Vec<VisitId> = self
            .visits
            .values()
            .filter(|v| v.patient_id == id)
            .map(|v| v.id)
            .collect();
        for visit_id in visit_ids {
            self.remove_visit(visit_id);
        }
        true
    }

    fn remove_visit(&mut self, id: VisitId) -> bool {
        if self.visits.remove(&id).is_none() {
            return false;
        }
        self.images.retain(|_, image| image.visit_id != id);
        true
    }

    fn insert_image(&mut self, visit_id: VisitId, object: &StoredObject) -> Result<VisitImage> {
        if !self.visits.contains_key(&visit_id) {
            return Err(ClinicError::not_found(format!("visit {visit_id}")));
        }
        let image = VisitImage {
            id: VisitImageId::new(),
            visit_id,
            image_url: object.url.clone(),
            object_id: object.object_id.clone(),
        };
        self.images.insert(image.id, image.clone());
        Ok(image)
    }
}

#[derive(Debug, Default)]
struct Faults {
    commits: AtomicBool,
    image_updates: AtomicBool,
    /// Non-transactional image inserts and deletes.
    image_inserts: AtomicBool,
    image_deletes: AtomicBool,
    /// Image inserts allowed before the next one fails; 0 means no fault.
    image_inserts_before_failure: AtomicUsize,
}

/// Relational store double. Transactions read a private copy of the tables
/// and replay their writes onto the shared copy on commit, so concurrent
/// transactions on different rows do not clobber each other.
#[derive(Debug, Default)]
pub struct MemoryClinicStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
    open_transactions: Arc<AtomicUsize>,
}

impl MemoryClinicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.faults.commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_image_updates(&self, fail: bool) {
        self.faults.image_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_image_inserts(&self, fail: bool) {
        self.faults.image_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_image_deletes(&self, fail: bool) {
        self.faults.image_deletes.store(fail, Ordering::SeqCst);
    }

    /// The `n`th transactional image insert from now on fails.
    pub fn fail_image_insert_number(&self, n: usize) {
        self.faults
            .image_inserts_before_failure
            .store(n, Ordering::SeqCst);
    }

    pub fn patient_count(&self) -> usize {
        self.tables.lock().patients.len()
    }

    pub fn visit_count(&self) -> usize {
        self.tables.lock().visits.len()
    }

    pub fn image_count(&self) -> usize {
        self.tables.lock().images.len()
    }

    pub fn image(&self, id: VisitImageId) -> Option<VisitImage> {
        self.tables.lock().images.get(&id).cloned()
    }

    /// Transactions begun and neither committed, rolled back nor dropped.
    pub fn open_transactions(&self) -> usize {
        self.open_transactions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatientsRepository for MemoryClinicStore {
    async fn create(&self, details: &PatientDetails) -> Result<Patient> {
        let patient = Patient::from_details(PatientId::new(), details.clone());
        self.tables
            .lock()
            .patients
            .insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn update(&self, id: PatientId, details: &PatientDetails) -> Result<Option<Patient>> {
        let mut tables = self.tables.lock();
        Ok(tables.patients.get_mut(&id).map(|patient| {
            *patient = Patient::from_details(id, details.clone());
            patient.clone()
        }))
    }

    async fn get(&self, id: PatientId) -> Result<Option<Patient>> {
        Ok(self.tables.lock().patients.get(&id).cloned())
    }

    async fn search_by_name(&self, term: &str) -> Result<Vec<Patient>> {
        let needle = term.to_lowercase();
        let mut found: Vec<Patient> = self
            .tables
            .lock()
            .patients
            .values()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        // Approximates a case-insensitive collation.
        found.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
                .then(a.id.cmp(&b.id))
        });
        Ok(found)
    }
}

#[async_trait]
impl VisitsRepository for MemoryClinicStore {
    async fn get(&self, id: VisitId) -> Result<Option<Visit>> {
        Ok(self.tables.lock().visits.get(&id).cloned())
    }

    async fn list_for_patient(&self, patient_id: PatientId) -> Result<Vec<Visit>> {
        let mut visits: Vec<Visit> = self
            .tables
            .lock()
            .visits
            .values()
            .filter(|v| v.patient_id == patient_id)
            .cloned()
            .collect();
        visits.sort_by(|a, b| b.visit_date.cmp(&a.visit_date).then(b.id.cmp(&a.id)));
        Ok(visits)
    }

    async fn update(&self, id: VisitId, details: &VisitDetails) -> Result<Option<Visit>> {
        let mut tables = self.tables.lock();
        Ok(tables.visits.get_mut(&id).map(|visit| {
            visit.visit_date = details.visit_date;
            visit.reason = details.reason.clone();
            visit.clone()
        }))
    }
}

#[async_trait]
impl VisitImagesRepository for MemoryClinicStore {
    async fn get(&self, id: VisitImageId) -> Result<Option<VisitImage>> {
        Ok(self.tables.lock().images.get(&id).cloned())
    }

    async fn list_for_visit(&self, visit_id: VisitId) -> Result<Vec<VisitImage>> {
        Ok(self
            .tables
            .lock()
            .images
            .values()
            .filter(|image| image.visit_id == visit_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, visit_id: VisitId, object: &StoredObject) -> Result<VisitImage> {
        if self.faults.image_inserts.load(Ordering::SeqCst) {
            return Err(ClinicError::Persistence("scripted image insert failure".into()));
        }
        self.tables.lock().insert_image(visit_id, object)
    }

    async fn replace_object(
        &self,
        id: VisitImageId,
        object: &StoredObject,
    ) -> Result<Option<VisitImage>> {
        if self.faults.image_updates.load(Ordering::SeqCst) {
            return Err(ClinicError::Persistence("scripted image update failure".into()));
        }
        let mut tables = self.tables.lock();
        Ok(tables.images.get_mut(&id).map(|image| {
            image.image_url = object.url.clone();
            image.object_id = object.object_id.clone();
            image.clone()
        }))
    }

    async fn delete(&self, id: VisitImageId) -> Result<bool> {
        if self.faults.image_deletes.load(Ordering::SeqCst) {
            return Err(ClinicError::Persistence("scripted image delete failure".into()));
        }
        Ok(self.tables.lock().images.remove(&id).is_some())
    }
}

#[async_trait]
impl TransactionalStore for MemoryClinicStore {
    async fn begin(&self) -> Result<Box<dyn ClinicTransaction>> {
        let working = self.tables.lock().clone();
        self.open_transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            shared: self.tables.clone(),
            faults: self.faults.clone(),
            open: self.open_transactions.clone(),
            working,
            writes: Vec::new(),
        }))
    }
}

#[derive(Debug)]
enum Write {
    Visit(Visit),
    Image(VisitImage),
    DeletePatient(PatientId),
    DeleteVisit(VisitId),
}

#[derive(Debug)]
struct MemoryTransaction {
    shared: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
    open: Arc<AtomicUsize>,
    working: Tables,
    writes: Vec<Write>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryTransaction {
    fn image_insert_faulted(&self) -> bool {
        let remaining = &self.faults.image_inserts_before_failure;
        match remaining.load(Ordering::SeqCst) {
            0 => false,
            1 => {
                remaining.store(0, Ordering::SeqCst);
                true
            }
            n => {
                remaining.store(n - 1, Ordering::SeqCst);
                false
            }
        }
    }

    fn objects_of(&self, visit_ids: &[VisitId]) -> Vec<String> {
        self.working
            .images
            .values()
            .filter(|image| visit_ids.contains(&image.visit_id))
            .map(|image| image.object_id.clone())
            .filter(|id| !id.trim().is_empty())
            .collect()
    }
}

#[async_trait]
impl ClinicTransaction for MemoryTransaction {
    async fn lock_patient_objects(&mut self, patient_id: PatientId) -> Result<Option<Vec<String>>> {
        if !self.working.patients.contains_key(&patient_id) {
            return Ok(None);
        }
        let visit_ids: Vec<VisitId> = self
            .working
            .visits
            .values()
            .filter(|v| v.patient_id == patient_id)
            .map(|v| v.id)
            .collect();
        Ok(Some(self.objects_of(&visit_ids)))
    }

    async fn lock_visit_objects(&mut self, visit_id: VisitId) -> Result<Option<Vec<String>>> {
        if !self.working.visits.contains_key(&visit_id) {
            return Ok(None);
        }
        Ok(Some(self.objects_of(&[visit_id])))
    }

    async fn insert_visit(&mut self, patient_id: PatientId, details: &VisitDetails) -> Result<Visit> {
        if !self.working.patients.contains_key(&patient_id) {
            return Err(ClinicError::not_found(format!("patient {patient_id}")));
        }
        let visit = Visit {
            id: VisitId::new(),
            patient_id,
            visit_date: details.visit_date,
            reason: details.reason.clone(),
        };
        self.working.visits.insert(visit.id, visit.clone());
        self.writes.push(Write::Visit(visit.clone()));
        Ok(visit)
    }

    async fn insert_visit_image(
        &mut self,
        visit_id: VisitId,
        object: &StoredObject,
    ) -> Result<VisitImage> {
        if self.image_insert_faulted() {
            return Err(ClinicError::Persistence("scripted image insert failure".into()));
        }
        let image = self.working.insert_image(visit_id, object)?;
        self.writes.push(Write::Image(image.clone()));
        Ok(image)
    }

    async fn delete_patient(&mut self, patient_id: PatientId) -> Result<bool> {
        let removed = self.working.remove_patient(patient_id);
        if removed {
            self.writes.push(Write::DeletePatient(patient_id));
        }
        Ok(removed)
    }

    async fn delete_visit(&mut self, visit_id: VisitId) -> Result<bool> {
        let removed = self.working.remove_visit(visit_id);
        if removed {
            self.writes.push(Write::DeleteVisit(visit_id));
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.faults.commits.load(Ordering::SeqCst) {
            return Err(ClinicError::Persistence("scripted commit failure".into()));
        }
        let mut shared = self.shared.lock();
        for write in &self.writes {
            match write {
                Write::Visit(visit) => {
                    shared.visits.insert(visit.id, visit.clone());
                }
                Write::Image(image) => {
                    shared.images.insert(image.id, image.clone());
                }
                Write::DeletePatient(id) => {
                    shared.remove_patient(*id);
                }
                Write::DeleteVisit(id) => {
                    shared.remove_visit(*id);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
