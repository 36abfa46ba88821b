//! Vitalia core: domain vocabulary, configuration, the privacy layer, the
//! assessment transition table, storage ports, and the data-rights workflow.
//!
//! Nothing in this crate talks to a network or a database directly. Inference
//! providers live in `vitalia-agent`, SQL persistence in `vitalia-db`.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod privacy;
pub mod rights;
pub mod storage;

pub use domain::assessment::{
    Assessment, AssessmentId, AssessmentStatus, HealthProfile, OwnerId, PendingQuestion,
    StoredAnswer,
};
pub use domain::consent::{Consent, ConsentId, ConsentType};
pub use domain::rights::{
    DataCategory, DataRestriction, ProcessingObjection, RectificationRecord, RestrictionStatus,
    SubjectProfile,
};
pub use errors::{ApplicationError, ConsentError, DomainError, InterfaceError, PrivacyError};
pub use privacy::{
    AnonymizationLevel, OperationCategory, OperationKind, PrivacyContext, RequestMetadata,
};
