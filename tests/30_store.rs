//! Runs the Postgres store against a live database. Skipped unless DATABASE_URL is set.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use speak_api::config::DatabaseConfig;
use speak_api::database::manager::{connect, migrate};
use speak_api::database::models::{
    new_id, AssignmentPatch, AssignmentStatus, Exercise, PatientExercise, Role, UploadState, User,
};
use speak_api::database::{ExerciseStore, PatientExerciseStore, PgStore, UserStore};

async fn store() -> Result<Option<PgStore>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres store test");
        return Ok(None);
    };

    let pool = connect(&DatabaseConfig {
        url: Some(url),
        max_connections: 2,
        connection_timeout: 5,
        query_timeout_secs: 10,
        auto_migrate: true,
    })?;
    migrate(&pool).await?;
    Ok(Some(PgStore::new(pool, Duration::from_secs(10))))
}

fn user(role: Role) -> User {
    let id = new_id();
    let now = Utc::now();
    User {
        user_id: id.clone(),
        first_name: "Grace".into(),
        last_name: role.as_str().into(),
        email: format!("{id}@store.test"),
        password_hash: "not-a-real-hash".into(),
        role,
        reference_code: (role == Role::Therapist).then(|| id[..8].to_ascii_uppercase()),
        profile_image: None,
        created_at: now,
        updated_at: now,
    }
}

fn exercise() -> Exercise {
    let now = Utc::now();
    Exercise {
        exercise_id: new_id(),
        name: "Sustained vowel".into(),
        description: "Hold an open vowel for five seconds".into(),
        video_url: String::new(),
        tags: vec!["voice".into()],
        created_at: now,
        updated_at: now,
    }
}

/// Therapist, linked patient, exercise and one assignment between them
async fn seed(store: &PgStore) -> Result<(User, User, Exercise, PatientExercise)> {
    let therapist = user(Role::Therapist);
    let mut patient = user(Role::Patient);
    patient.reference_code = therapist.reference_code.clone();
    let exercise = exercise();
    let assignment = PatientExercise::new(&patient.user_id, &therapist.user_id, &exercise.exercise_id);

    store.insert_user(&therapist).await?;
    store.insert_user(&patient).await?;
    store.insert_exercise(&exercise).await?;
    store.insert_assignments(std::slice::from_ref(&assignment)).await?;
    Ok((therapist, patient, exercise, assignment))
}

#[tokio::test]
async fn partial_updates_touch_only_the_given_columns() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let (_, _, _, assignment) = seed(&store).await?;
    let id = &assignment.patient_exercise_id;

    let issued = store
        .update_assignment(
            id,
            &AssignmentPatch {
                upload_state: Some(UploadState::CredentialIssued),
                recording_key: Some(format!("recordings/{id}.mp4")),
                wrapped_key: Some("d3JhcHBlZA==".into()),
                ..AssignmentPatch::default()
            },
        )
        .await?;
    assert_eq!(issued.upload_state, UploadState::CredentialIssued);
    assert_eq!(issued.recording, "");

    let recorded = store
        .update_assignment(id, &AssignmentPatch { recording: Some("https://cdn.example/r.mp4".into()), ..AssignmentPatch::default() })
        .await?;
    assert_eq!(recorded.upload_state, UploadState::CredentialIssued);
    assert_eq!(recorded.recording, "https://cdn.example/r.mp4");
    assert_eq!(recorded.wrapped_key, "d3JhcHBlZA==");

    let completed = store
        .update_assignment(id, &AssignmentPatch { upload_state: Some(UploadState::Completed), ..AssignmentPatch::default() })
        .await?;
    assert_eq!(completed.status(), AssignmentStatus::Completed);
    assert_eq!(completed.recording, "https://cdn.example/r.mp4");
    assert_eq!(completed.recording_key, format!("recordings/{id}.mp4"));
    assert!(completed.is_retrievable());

    let missing = store.update_assignment(&new_id(), &AssignmentPatch::default()).await;
    assert!(matches!(missing, Err(speak_api::database::DatabaseError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn listing_and_report_join_their_owners() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let (therapist, patient, exercise, assignment) = seed(&store).await?;

    let listed = store.list_by_patient(&patient.user_id).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].patient_exercise.patient_exercise_id, assignment.patient_exercise_id);
    assert_eq!(listed[0].exercise.as_ref().map(|e| e.name.as_str()), Some("Sustained vowel"));

    let report = store.assignment_report(&assignment.patient_exercise_id).await?.expect("report");
    assert_eq!(report.status, AssignmentStatus::Pending);
    assert_eq!(report.patient.expect("patient").name, "Grace patient");
    assert_eq!(report.therapist.expect("therapist").user_id, therapist.user_id);
    assert_eq!(report.exercise.expect("exercise").exercise_id, exercise.exercise_id);

    let code = therapist.reference_code.as_deref().unwrap_or_default();
    let linked = store.list_patients(code).await?;
    assert_eq!(linked.iter().map(|u| u.user_id.as_str()).collect::<Vec<_>>(), vec![patient.user_id.as_str()]);
    Ok(())
}

#[tokio::test]
async fn therapist_delete_cascades_in_one_transaction() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let (therapist, patient, _, assignment) = seed(&store).await?;

    // A therapist row that was never stored shares the code; nothing may change
    let mut ghost = user(Role::Therapist);
    ghost.reference_code = therapist.reference_code.clone();
    let removal = store.delete_user_cascade(&ghost).await?;
    assert!(!removal.deleted);
    assert_eq!(store.find_user(&patient.user_id).await?.expect("patient").reference_code, therapist.reference_code);

    let removal = store.delete_user_cascade(&therapist).await?;
    assert!(removal.deleted);
    assert_eq!(removal.unlinked_patients, 1);
    assert_eq!(removal.assignments, 1);

    assert!(store.find_user(&therapist.user_id).await?.is_none());
    assert_eq!(store.find_user(&patient.user_id).await?.expect("patient").reference_code, None);
    assert!(store.find_assignment(&assignment.patient_exercise_id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn patient_delete_takes_their_assignments() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let (therapist, patient, _, assignment) = seed(&store).await?;

    let removal = store.delete_user_cascade(&patient).await?;
    assert!(removal.deleted);
    assert_eq!(removal.assignments, 1);
    assert_eq!(removal.unlinked_patients, 0);

    assert!(store.find_assignment(&assignment.patient_exercise_id).await?.is_none());
    assert!(store.find_user(&therapist.user_id).await?.is_some());
    Ok(())
}
