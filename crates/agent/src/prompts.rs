use serde::Serialize;
use serde_json::{json, Value};
use tera::{Context, Tera};
use thiserror::Error;

use vitalia_core::errors::ApplicationError;
use vitalia_core::privacy::PrivacyContext;

use crate::llm::{Prompt, PromptTask};

const SYSTEM: &str = "\
You are Vitalia, a nutrition and wellness assistant. You give practical, \
evidence-based guidance and you never diagnose medical conditions.
Data protection posture: anonymization level {{ anonymization_level }}\
{% if gdpr %}, GDPR{% endif %}{% if lopdgdd %}, LOPDGDD{% endif %}.
The data you receive has been minimized and anonymized. Never ask for names, \
contact details, locations or identity documents.";

const QUESTION: &str = "\
Health profile:
{{ profile | json_encode(pretty=true) }}

{% if history | length > 0 %}Answers so far:
{% for item in history %}{{ loop.index }}. {{ item.question }} -> {{ item.answer }}
{% endfor %}{% else %}No answers yet.
{% endif %}
Write question {{ number }} of {{ total }} of a nutrition habits assessment. \
Ask exactly one short question that has not been asked yet. Reply with the question only.";

const RECOMMENDATIONS: &str = "\
Health profile:
{{ profile | json_encode(pretty=true) }}

Assessment answers:
{% for item in history %}{{ loop.index }}. {{ item.question }} -> {{ item.answer }}
{% endfor %}
Write personalised nutrition and lifestyle recommendations as a short list. \
Mention when a health professional should be consulted.";

const ADVICE: &str = "\
Context:
{{ payload | json_encode(pretty=true) }}

Answer the question in the context with concise, practical nutrition advice.";

const MEAL_PLAN: &str = "\
Context:
{{ payload | json_encode(pretty=true) }}

Write a {{ days }}-day meal plan with {{ meals_per_day }} meals per day. \
Respect allergies and dietary preferences. Use one line per meal.";

const PROGRESS: &str = "\
Progress entries:
{{ payload | json_encode(pretty=true) }}

Summarise the trend in these entries and suggest one or two next steps.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(String),
}

impl From<tera::Error> for PromptError {
    fn from(value: tera::Error) -> Self {
        Self::Template(value.to_string())
    }
}

impl From<PromptError> for ApplicationError {
    fn from(value: PromptError) -> Self {
        Self::Configuration(value.to_string())
    }
}

/// One question/answer pair as shown to a provider. Answers are anonymized.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryItem {
    pub question: String,
    pub answer: String,
}

pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("system", SYSTEM),
            ("question", QUESTION),
            ("recommendations", RECOMMENDATIONS),
            ("advice", ADVICE),
            ("meal_plan", MEAL_PLAN),
            ("progress", PROGRESS),
        ])?;
        Ok(Self { tera })
    }

    pub fn question(
        &self,
        number: usize,
        total: u32,
        profile: &Value,
        history: &[HistoryItem],
        privacy: &PrivacyContext,
    ) -> Result<Prompt, PromptError> {
        let mut context = Context::new();
        context.insert("profile", profile);
        context.insert("history", history);
        context.insert("number", &number);
        context.insert("total", &total);
        self.render(
            PromptTask::AssessmentQuestion { number, total },
            "question",
            &context,
            json!({ "profile": profile, "history": history }),
            privacy,
        )
    }

    pub fn recommendations(
        &self,
        profile: &Value,
        history: &[HistoryItem],
        privacy: &PrivacyContext,
    ) -> Result<Prompt, PromptError> {
        let mut context = Context::new();
        context.insert("profile", profile);
        context.insert("history", history);
        self.render(
            PromptTask::Recommendations,
            "recommendations",
            &context,
            json!({ "profile": profile, "history": history }),
            privacy,
        )
    }

    pub fn advice(&self, payload: &Value, privacy: &PrivacyContext) -> Result<Prompt, PromptError> {
        let mut context = Context::new();
        context.insert("payload", payload);
        self.render(PromptTask::Advice, "advice", &context, payload.clone(), privacy)
    }

    pub fn meal_plan(
        &self,
        days: u32,
        meals_per_day: u32,
        payload: &Value,
        privacy: &PrivacyContext,
    ) -> Result<Prompt, PromptError> {
        let mut context = Context::new();
        context.insert("payload", payload);
        context.insert("days", &days);
        context.insert("meals_per_day", &meals_per_day);
        self.render(
            PromptTask::MealPlan { days, meals_per_day },
            "meal_plan",
            &context,
            payload.clone(),
            privacy,
        )
    }

    pub fn progress(&self, payload: &Value, privacy: &PrivacyContext) -> Result<Prompt, PromptError> {
        let mut context = Context::new();
        context.insert("payload", payload);
        self.render(PromptTask::ProgressReview, "progress", &context, payload.clone(), privacy)
    }

    fn render(
        &self,
        task: PromptTask,
        template: &str,
        context: &Context,
        payload: Value,
        privacy: &PrivacyContext,
    ) -> Result<Prompt, PromptError> {
        let mut posture = Context::new();
        posture.insert("anonymization_level", privacy.effective_level().as_str());
        posture.insert("gdpr", &privacy.compliance.gdpr);
        posture.insert("lopdgdd", &privacy.compliance.lopdgdd);

        Ok(Prompt {
            task,
            system: self.tera.render("system", &posture)?,
            user: self.tera.render(template, context)?,
            context: payload,
        })
    }
}
