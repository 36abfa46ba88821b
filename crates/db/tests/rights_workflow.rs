use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;

use vitalia_core::audit::InMemoryAuditSink;
use vitalia_core::domain::assessment::{
    Assessment, AssessmentId, AssessmentStatus, HealthProfile, OwnerId, StoredAnswer,
};
use vitalia_core::domain::consent::{ConsentId, ConsentType};
use vitalia_core::domain::rights::DataCategory;
use vitalia_core::errors::{ApplicationError, DomainError};
use vitalia_core::flows::AssessmentLocks;
use vitalia_core::privacy::crypto::{encrypt_json, AesGcmCipher, DataCipher};
use vitalia_core::privacy::{ConsentValidator, StoredConsentValidator};
use vitalia_core::rights::{DataRightsService, ExportFormat};
use vitalia_core::storage::{AssessmentRepository, ConsentRepository, Stores};
use vitalia_db::{
    InMemoryAssessmentRepository, InMemoryConsentRepository, InMemoryDataRightsRepository,
    InMemorySubjectEraser,
};

struct Harness {
    service: DataRightsService,
    assessments: Arc<InMemoryAssessmentRepository>,
    consents: Arc<InMemoryConsentRepository>,
    cipher: Arc<AesGcmCipher>,
    audit: Arc<InMemoryAuditSink>,
}

fn harness() -> Harness {
    let secret: SecretString = "rights-workflow-test-key-0123456789".to_owned().into();
    let cipher = Arc::new(AesGcmCipher::from_secret(&secret).expect("cipher"));
    let assessments = Arc::new(InMemoryAssessmentRepository::default());
    let consents = Arc::new(InMemoryConsentRepository::default());
    let rights = Arc::new(InMemoryDataRightsRepository::default());
    let audit = Arc::new(InMemoryAuditSink::default());
    let stores = Stores {
        assessments: assessments.clone(),
        consents: consents.clone(),
        rights: rights.clone(),
        eraser: Arc::new(InMemorySubjectEraser::new(assessments.clone(), rights)),
    };
    let service = DataRightsService::new(
        stores,
        cipher.clone(),
        audit.clone(),
        AssessmentLocks::default(),
    );
    Harness { service, assessments, consents, cipher, audit }
}

fn profile() -> HealthProfile {
    HealthProfile {
        age: 45,
        weight: 82.0,
        height: 176.0,
        gender: "male".to_owned(),
        activity_level: "light".to_owned(),
        goals: vec!["weight_loss".to_owned()],
        medical_conditions: vec!["hypertension".to_owned()],
        allergies: Vec::new(),
        dietary_preferences: Vec::new(),
    }
}

async fn seed_assessment(h: &Harness, id: &str, owner: &OwnerId) -> Assessment {
    let cipher: &dyn DataCipher = h.cipher.as_ref();
    let now = Utc::now();
    let assessment = Assessment {
        id: AssessmentId(id.to_owned()),
        owner_id: owner.clone(),
        status: AssessmentStatus::InProgress,
        raw_health_data: encrypt_json(cipher, &profile()).expect("encrypt"),
        anonymized_health_data: encrypt_json(cipher, &json!({ "age": 45 })).expect("encrypt"),
        answers: vec![StoredAnswer {
            question_id: "q1".to_owned(),
            question_text: "How often do you eat vegetables?".to_owned(),
            answer: cipher.encrypt("twice a day").expect("encrypt"),
            confidence: 0.9,
            answered_at: now,
        }],
        total_questions: 15,
        pending_question: None,
        recommendations: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };
    h.assessments.save(&assessment).await.expect("save assessment");
    assessment
}

fn owner(id: &str) -> OwnerId {
    OwnerId(id.to_owned())
}

#[tokio::test]
async fn access_without_records_is_not_found() {
    let h = harness();
    let result = h.service.get_user_data(&owner("nobody"), "req-1").await;
    assert!(matches!(result, Err(ApplicationError::Domain(DomainError::NotFound { .. }))));
}

#[tokio::test]
async fn access_returns_decrypted_aggregate_and_export_formats() {
    let h = harness();
    let user = owner("user-1");
    seed_assessment(&h, "a-1", &user).await;
    h.service
        .grant_consent(&user, ConsentType::HealthDataProcessing, "assessment", None, "req-1")
        .await
        .expect("grant");

    let aggregate = h.service.get_user_data(&user, "req-2").await.expect("access");
    assert_eq!(aggregate.assessments.len(), 1);
    assert_eq!(aggregate.assessments[0].health_data, profile());
    assert_eq!(aggregate.assessments[0].answers[0].answer, "twice a day");
    assert_eq!(aggregate.assessments[0].progress, 7);
    assert_eq!(aggregate.consents.len(), 1);

    let csv = h.service.export_user_data(&user, ExportFormat::Csv, "req-3").await.expect("csv");
    assert_eq!(csv.content_type, "text/csv; charset=utf-8");
    assert!(csv.body.contains("hypertension"));
    assert!(csv.file_name.ends_with(".csv"));

    let xml = h.service.export_user_data(&user, ExportFormat::Xml, "req-4").await.expect("xml");
    assert!(xml.body.contains("<userData>"));
    assert!(h.audit.event_types().contains(&"rights.data_exported".to_owned()));
}

#[tokio::test]
async fn rectification_updates_profile_and_keeps_a_log() {
    let h = harness();
    let user = owner("user-1");

    let unknown = h.service.rectify_field(&user, "bloodType", json!("A+"), "req-1").await;
    assert!(matches!(
        unknown,
        Err(ApplicationError::Domain(DomainError::Validation { .. }))
    ));

    let first = h.service.rectify_field(&user, "weight", json!(78.5), "req-2").await.expect("rectify");
    assert_eq!(first.old_value, json!(null));
    assert_eq!(first.new_value, json!(78.5));

    let second = h.service.rectify_field(&user, "weight", json!(77), "req-3").await.expect("rectify");
    assert_eq!(second.old_value, json!(78.5));

    let aggregate = h.service.get_user_data(&user, "req-4").await.expect("access");
    assert_eq!(aggregate.rectifications.len(), 2);
    assert_eq!(aggregate.profile.and_then(|p| p.weight), Some(77.0));
}

#[tokio::test]
async fn health_restriction_moves_open_assessments_to_restricted() {
    let h = harness();
    let user = owner("user-1");
    let seeded = seed_assessment(&h, "a-1", &user).await;

    let invalid = h
        .service
        .restrict_processing(&user, "accuracy dispute", vec![DataCategory::HealthData], Some(0), "req-1")
        .await;
    assert!(matches!(invalid, Err(ApplicationError::Domain(DomainError::Validation { .. }))));

    let outcome = h
        .service
        .restrict_processing(&user, "accuracy dispute", vec![DataCategory::HealthData], None, "req-2")
        .await
        .expect("restrict");
    assert_eq!(outcome.restricted_assessments, 1);
    assert_eq!(
        (outcome.restriction.restriction.end_date - outcome.restriction.restriction.start_date)
            .num_days(),
        30
    );

    let stored = h
        .assessments
        .find_by_id_and_owner(&seeded.id, &user)
        .await
        .expect("find")
        .expect("present");
    assert_eq!(stored.status, AssessmentStatus::Restricted);
    assert!(h.audit.event_types().contains(&"assessment.transition_applied".to_owned()));
}

#[tokio::test]
async fn profile_only_restriction_leaves_assessments_alone() {
    let h = harness();
    let user = owner("user-1");
    let seeded = seed_assessment(&h, "a-1", &user).await;

    let outcome = h
        .service
        .restrict_processing(&user, "marketing review", vec![DataCategory::Profile], Some(10), "req-1")
        .await
        .expect("restrict");
    assert_eq!(outcome.restricted_assessments, 0);

    let stored = h.assessments.find_by_id_and_owner(&seeded.id, &user).await.expect("find");
    assert_eq!(stored.map(|a| a.status), Some(AssessmentStatus::InProgress));
}

#[tokio::test]
async fn erasure_counts_records_and_preserves_consents() {
    let h = harness();
    let user = owner("user-1");
    seed_assessment(&h, "a-1", &user).await;
    seed_assessment(&h, "a-2", &user).await;
    h.service.rectify_field(&user, "firstName", json!("Jon"), "req-1").await.expect("rectify");
    h.service
        .object_to_processing(&user, "no profiling", "analytics", "req-2")
        .await
        .expect("object");
    h.service
        .grant_consent(&user, ConsentType::AiAnalysis, "advice", Some(30), "req-3")
        .await
        .expect("grant");

    // 2 assessments + profile + 1 rectification + 1 objection.
    let summary = h.service.delete_user_data(&user, Vec::new(), "req-4").await.expect("delete");
    assert_eq!(summary.deleted_records, 5);
    assert_eq!(summary.categories, vec![DataCategory::All]);
    assert_eq!(h.consents.list_by_owner(&user).await.expect("consents").len(), 1);

    let again = h.service.delete_user_data(&user, Vec::new(), "req-5").await;
    assert!(matches!(again, Err(ApplicationError::Domain(DomainError::NotFound { .. }))));
}

#[tokio::test]
async fn consent_lifecycle_is_owner_scoped() {
    let h = harness();
    let user = owner("user-1");
    let consent = h
        .service
        .grant_consent(&user, ConsentType::HealthDataProcessing, "assessment", None, "req-1")
        .await
        .expect("grant");

    let foreign = h.service.revoke_consent(&owner("user-2"), &consent.id, "req-2").await;
    assert!(matches!(foreign, Err(ApplicationError::Domain(DomainError::NotFound { .. }))));

    let validator = StoredConsentValidator::new(h.consents.clone());
    assert!(validator.validate(&user, &consent.id.0).await.expect("validate"));
    assert!(!validator.validate(&owner("user-2"), &consent.id.0).await.expect("validate"));
    assert!(!validator.validate(&user, "unknown-token").await.expect("validate"));

    let revoked = h.service.revoke_consent(&user, &consent.id, "req-3").await.expect("revoke");
    assert!(!revoked.granted);
    assert!(!validator.validate(&user, &consent.id.0).await.expect("validate"));

    let listed = h.service.list_consents(&user).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, ConsentId(consent.id.0.clone()));
}

#[tokio::test]
async fn non_health_consent_is_not_a_valid_token() {
    let h = harness();
    let user = owner("user-1");
    let consent = h
        .service
        .grant_consent(&user, ConsentType::Marketing, "newsletter", None, "req-1")
        .await
        .expect("grant");

    let validator = StoredConsentValidator::new(h.consents.clone());
    assert!(!validator.validate(&user, &consent.id.0).await.expect("validate"));
}
