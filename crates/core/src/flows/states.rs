use serde::{Deserialize, Serialize};

use crate::domain::assessment::AssessmentStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    AnswerRecorded,
    FinalAnswerRecorded,
    RestrictionRequested,
    DeletionRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    /// Answers on record, including the one that triggered the event.
    pub answered: usize,
    pub total_questions: u32,
}

impl FlowContext {
    pub fn new(answered: usize, total_questions: u32) -> Self {
        Self { answered, total_questions }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: AssessmentStatus,
    pub to: AssessmentStatus,
    pub event: FlowEvent,
}
