use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::assessment::AssessmentStatus;
use crate::flows::states::{FlowContext, FlowEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> AssessmentStatus;
    fn transition(
        &self,
        current: &AssessmentStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct AssessmentFlow;

impl FlowDefinition for AssessmentFlow {
    fn initial_state(&self) -> AssessmentStatus {
        AssessmentStatus::InProgress
    }

    fn transition(
        &self,
        current: &AssessmentStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_assessment(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> AssessmentStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &AssessmentStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &AssessmentStatus,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    audit
                        .event(
                            "assessment.transition_applied",
                            AuditCategory::Assessment,
                            AuditOutcome::Success,
                        )
                        .with_metadata("from", outcome.from.as_str())
                        .with_metadata("to", outcome.to.as_str())
                        .with_metadata("event", format!("{:?}", outcome.event))
                        .with_metadata("answered", context.answered.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event(
                            "assessment.transition_rejected",
                            AuditCategory::Assessment,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("from", current.as_str())
                        .with_metadata("event", format!("{event:?}"))
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<AssessmentFlow> {
    fn default() -> Self {
        Self::new(AssessmentFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("{answered} of {total_questions} answers recorded, which does not fit event {event:?}")]
    AnswerCountMismatch { event: FlowEvent, answered: usize, total_questions: u32 },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: AssessmentStatus, event: FlowEvent },
}

fn transition_assessment(
    current: &AssessmentStatus,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use AssessmentStatus::{Completed, Deleted, InProgress, Restricted};
    use FlowEvent::{AnswerRecorded, DeletionRequested, FinalAnswerRecorded, RestrictionRequested};

    let total = context.total_questions as usize;
    let to = match (current, event) {
        (InProgress, AnswerRecorded) => {
            if context.answered >= total {
                return Err(count_mismatch(event, context));
            }
            InProgress
        }
        (InProgress, FinalAnswerRecorded) => {
            if context.answered != total {
                return Err(count_mismatch(event, context));
            }
            Completed
        }
        (InProgress, RestrictionRequested) | (Completed, RestrictionRequested) => Restricted,
        (Deleted, _) => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
        (_, DeletionRequested) => Deleted,
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone() })
}

fn count_mismatch(event: &FlowEvent, context: &FlowContext) -> FlowTransitionError {
    FlowTransitionError::AnswerCountMismatch {
        event: event.clone(),
        answered: context.answered,
        total_questions: context.total_questions,
    }
}
