//! In-memory doubles for the store, KMS and object storage, shared by unit and router tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::auth::TokenKind;
use crate::config::AppConfig;
use crate::database::models::{
    AssignmentPatch, AssignmentReport, Exercise, ExercisePatch, ExerciseSummary, Page, Participant, PatientExercise,
    PatientExerciseDetail, Role, User, UserPatch,
};
use crate::database::{DatabaseError, ExerciseStore, PatientExerciseStore, Store, UserRemoval, UserStore};
use crate::services::{KeyManagementService, KeyWrapError, ObjectAcl, ObjectStorage, PresignedUrl, StorageError};
use crate::state::AppState;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    exercises: HashMap<String, Exercise>,
    assignments: HashMap<String, PatientExercise>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn assignment(&self, id: &str) -> Option<PatientExercise> {
        self.tables().assignments.get(id).cloned()
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.tables().users.get(id).cloned()
    }

    pub fn put_user(&self, user: User) {
        self.tables().users.insert(user.user_id.clone(), user);
    }

    pub fn put_exercise(&self, exercise: Exercise) {
        self.tables().exercises.insert(exercise.exercise_id.clone(), exercise);
    }

    pub fn put_assignment(&self, assignment: PatientExercise) {
        self.tables().assignments.insert(assignment.patient_exercise_id.clone(), assignment);
    }
}

fn page_of<T>(rows: Vec<T>, page: Page) -> Vec<T> {
    rows.into_iter()
        .skip(page.offset() as usize)
        .take(page.per_page as usize)
        .collect()
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        let mut tables = self.tables();
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(DatabaseError::Conflict("users_email_key".to_string()));
        }
        tables.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self.user(user_id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self.tables().users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_therapist_by_code(&self, code: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| u.role == Role::Therapist && u.reference_code.as_deref() == Some(code))
            .cloned())
    }

    async fn list_users(&self, page: Page) -> Result<(i64, Vec<User>), DatabaseError> {
        let mut users: Vec<User> = self.tables().users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((users.len() as i64, page_of(users, page)))
    }

    async fn list_patients(&self, therapist_code: &str) -> Result<Vec<User>, DatabaseError> {
        Ok(self
            .tables()
            .users
            .values()
            .filter(|u| u.role == Role::Patient && u.reference_code.as_deref() == Some(therapist_code))
            .cloned()
            .collect())
    }

    async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<User, DatabaseError> {
        let mut tables = self.tables();
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {user_id}")))?;
        if let Some(v) = &patch.first_name {
            user.first_name = v.clone();
        }
        if let Some(v) = &patch.last_name {
            user.last_name = v.clone();
        }
        if let Some(v) = &patch.reference_code {
            user.reference_code = Some(v.clone());
        }
        if let Some(v) = &patch.profile_image {
            user.profile_image = Some(v.clone());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user_cascade(&self, user: &User) -> Result<UserRemoval, DatabaseError> {
        let mut tables = self.tables();
        if !tables.users.contains_key(&user.user_id) {
            return Ok(UserRemoval::default());
        }

        let mut removal = UserRemoval { deleted: true, ..UserRemoval::default() };
        if let (Role::Therapist, Some(code)) = (user.role, &user.reference_code) {
            for patient in tables.users.values_mut() {
                if patient.role == Role::Patient && patient.reference_code.as_ref() == Some(code) {
                    patient.reference_code = None;
                    removal.unlinked_patients += 1;
                }
            }
        }

        let before = tables.assignments.len();
        tables.assignments.retain(|_, pe| match user.role {
            Role::Patient => pe.patient_id != user.user_id,
            Role::Therapist => pe.therapist_id != user.user_id,
        });
        removal.assignments = (before - tables.assignments.len()) as u64;
        tables.users.remove(&user.user_id);
        Ok(removal)
    }
}

#[async_trait]
impl ExerciseStore for MemoryStore {
    async fn insert_exercise(&self, exercise: &Exercise) -> Result<(), DatabaseError> {
        self.put_exercise(exercise.clone());
        Ok(())
    }

    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>, DatabaseError> {
        Ok(self.tables().exercises.get(exercise_id).cloned())
    }

    async fn find_exercises(&self, ids: &[String]) -> Result<Vec<Exercise>, DatabaseError> {
        let tables = self.tables();
        Ok(ids.iter().filter_map(|id| tables.exercises.get(id).cloned()).collect())
    }

    async fn list_exercises(&self, page: Page) -> Result<(i64, Vec<Exercise>), DatabaseError> {
        let mut exercises: Vec<Exercise> = self.tables().exercises.values().cloned().collect();
        exercises.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((exercises.len() as i64, page_of(exercises, page)))
    }

    async fn update_exercise(&self, exercise_id: &str, patch: &ExercisePatch) -> Result<Exercise, DatabaseError> {
        let mut tables = self.tables();
        let exercise = tables
            .exercises
            .get_mut(exercise_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("exercise {exercise_id}")))?;
        if let Some(v) = &patch.name {
            exercise.name = v.clone();
        }
        if let Some(v) = &patch.description {
            exercise.description = v.clone();
        }
        if let Some(v) = &patch.video_url {
            exercise.video_url = v.clone();
        }
        if let Some(v) = &patch.tags {
            exercise.tags = v.clone();
        }
        exercise.updated_at = Utc::now();
        Ok(exercise.clone())
    }

    async fn delete_exercise(&self, exercise_id: &str) -> Result<bool, DatabaseError> {
        Ok(self.tables().exercises.remove(exercise_id).is_some())
    }
}

#[async_trait]
impl PatientExerciseStore for MemoryStore {
    async fn insert_assignments(&self, assignments: &[PatientExercise]) -> Result<(), DatabaseError> {
        for pe in assignments {
            self.put_assignment(pe.clone());
        }
        Ok(())
    }

    async fn find_assignment(&self, id: &str) -> Result<Option<PatientExercise>, DatabaseError> {
        Ok(self.assignment(id))
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<PatientExerciseDetail>, DatabaseError> {
        let tables = self.tables();
        let mut details: Vec<PatientExerciseDetail> = tables
            .assignments
            .values()
            .filter(|pe| pe.patient_id == patient_id)
            .map(|pe| PatientExerciseDetail {
                exercise: tables.exercises.get(&pe.exercise_id).cloned(),
                patient_exercise: pe.clone(),
            })
            .collect();
        details.sort_by(|a, b| a.patient_exercise.created_at.cmp(&b.patient_exercise.created_at));
        Ok(details)
    }

    async fn update_assignment(&self, id: &str, patch: &AssignmentPatch) -> Result<PatientExercise, DatabaseError> {
        let mut tables = self.tables();
        let pe = tables
            .assignments
            .get_mut(id)
            .ok_or_else(|| DatabaseError::NotFound(format!("patient exercise {id}")))?;
        patch.apply_to(pe);
        Ok(pe.clone())
    }

    async fn delete_assignment(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.tables().assignments.remove(id).is_some())
    }

    async fn assignment_report(&self, id: &str) -> Result<Option<AssignmentReport>, DatabaseError> {
        let tables = self.tables();
        let Some(pe) = tables.assignments.get(id) else {
            return Ok(None);
        };
        let participant = |user_id: &str| {
            tables.users.get(user_id).map(|u| Participant { user_id: u.user_id.clone(), name: u.full_name() })
        };
        Ok(Some(AssignmentReport {
            patient_exercise_id: pe.patient_exercise_id.clone(),
            status: pe.status(),
            patient: participant(&pe.patient_id),
            therapist: participant(&pe.therapist_id),
            exercise: tables.exercises.get(&pe.exercise_id).map(|e| ExerciseSummary {
                exercise_id: e.exercise_id.clone(),
                name: e.name.clone(),
                description: e.description.clone(),
                video_url: e.video_url.clone(),
            }),
        }))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Reversible stand-in for KMS: ciphertext is the plaintext behind a key-bound prefix
#[derive(Default)]
pub struct FakeKms {
    calls: Arc<AtomicUsize>,
    failing: bool,
}

impl FakeKms {
    pub fn failing() -> Self {
        Self { failing: true, ..Default::default() }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn prefix(key_id: &str) -> Vec<u8> {
        format!("fake-kms:{key_id}:").into_bytes()
    }
}

#[async_trait]
impl KeyManagementService for FakeKms {
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KeyWrapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(KeyWrapError::KeyService("AccessDeniedException".to_string()));
        }
        let mut out = Self::prefix(key_id);
        out.extend(plaintext.iter().rev());
        Ok(out)
    }

    async fn decrypt(&self, key_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, KeyWrapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prefix = Self::prefix(key_id);
        if self.failing || !ciphertext.starts_with(&prefix) {
            return Err(KeyWrapError::KeyService("InvalidCiphertextException".to_string()));
        }
        Ok(ciphertext[prefix.len()..].iter().rev().copied().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignRecord {
    pub method: &'static str,
    pub key: String,
    pub expires_in: Duration,
}

/// Object storage double that records presigned requests and keeps puts in memory
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, (Bytes, ObjectAcl)>>,
    presigned: Mutex<Vec<PresignRecord>>,
    fail_puts: AtomicBool,
}

impl FakeStorage {
    pub fn simulate_client_upload(&self, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::from_static(b"client ciphertext"), ObjectAcl::Private));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn acl_of(&self, key: &str) -> Option<ObjectAcl> {
        self.objects.lock().unwrap().get(key).map(|(_, acl)| *acl)
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn presigned_expiries(&self) -> Vec<Duration> {
        self.presigned.lock().unwrap().iter().map(|r| r.expires_in).collect()
    }

    pub fn presigned_gets(&self) -> Vec<PresignRecord> {
        self.presigned.lock().unwrap().iter().filter(|r| r.method == "GET").cloned().collect()
    }

    fn presign(&self, method: &'static str, key: &str, expires_in: Duration) -> PresignedUrl {
        self.presigned.lock().unwrap().push(PresignRecord { method, key: key.to_string(), expires_in });
        PresignedUrl {
            url: format!(
                "https://bucket.storage.test/{key}?X-Amz-Expires={}&X-Amz-Signature={}",
                expires_in.as_secs(),
                method.to_ascii_lowercase()
            ),
            expires_in,
        }
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn presign_put(&self, key: &str, expires_in: Duration) -> Result<PresignedUrl, StorageError> {
        Ok(self.presign("PUT", key, expires_in))
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<PresignedUrl, StorageError> {
        Ok(self.presign("GET", key, expires_in))
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        _content_type: Option<&str>,
        acl: ObjectAcl,
    ) -> Result<(), StorageError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Request("503 Slow Down".to_string()));
        }
        self.objects.lock().unwrap().insert(key.to_string(), (body, acl));
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.contains(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.storage.test/{key}")
    }
}

pub fn sample_user(role: Role) -> User {
    let now = Utc::now();
    let id = crate::database::models::new_id();
    User {
        email: format!("{id}@example.com"),
        user_id: id,
        first_name: "Test".to_string(),
        last_name: match role {
            Role::Patient => "Patient".to_string(),
            Role::Therapist => "Therapist".to_string(),
        },
        password_hash: String::new(),
        role,
        reference_code: match role {
            Role::Patient => None,
            Role::Therapist => Some(crate::auth::password::generate_reference_code()),
        },
        profile_image: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_exercise(name: &str) -> Exercise {
    let now = Utc::now();
    Exercise {
        exercise_id: crate::database::models::new_id(),
        name: name.to_string(),
        description: format!("{name} practice"),
        video_url: String::new(),
        tags: vec!["articulation".to_string()],
        created_at: now,
        updated_at: now,
    }
}

/// A pending assignment with no linked users or exercise
pub fn seed_assignment(store: &MemoryStore) -> PatientExercise {
    let pe = PatientExercise::new("patient-1", "therapist-1", "exercise-1");
    store.put_assignment(pe.clone());
    pe
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = AppConfig::development();
        config.kms.key_id = "test-key".to_string();
        config.security.jwt_secret = "router-test-secret".to_string();

        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(FakeStorage::default());
        let state = AppState::new(store.clone(), Arc::new(FakeKms::default()), storage.clone(), &config);
        Self { state, store, storage }
    }

    /// Stores `user` and returns an `Authorization` header value for it
    pub fn login_as(&self, user: &User) -> String {
        self.store.put_user(user.clone());
        let token = self.state.tokens.issue(user, TokenKind::Access).unwrap();
        format!("Bearer {token}")
    }
}
