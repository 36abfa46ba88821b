//! Deterministic last-resort tier. Never touches the network, so a chain that
//! ends with it always produces an answer.

use async_trait::async_trait;
use serde_json::Value;

use vitalia_core::config::ProviderKind;

use crate::llm::{Generation, InferenceProvider, Prompt, PromptTask, ProviderError};

pub const FALLBACK_KEY: &str = "fallback-default";
pub const QUESTION_BANK_MODEL: &str = "rule-based-question-bank";
pub const RECOMMENDATIONS_MODEL: &str = "rule-based-recommendations";
pub const MEAL_PLAN_MODEL: &str = "rule-based-meal-plan";
pub const PROGRESS_MODEL: &str = "rule-based-progress";

struct RuleResponse {
    key: &'static str,
    keywords: &'static [&'static str],
    text: &'static str,
}

/// First match wins.
const RESPONSES: &[RuleResponse] = &[
    RuleResponse {
        key: "diabetes",
        keywords: &["diabetes", "blood sugar", "glucose", "glucosa", "insulin"],
        text: "Keep carbohydrate portions consistent across meals, favour whole grains and legumes over refined starches, and pair carbohydrates with protein or fibre. Review any change in medication or diet with your healthcare team.",
    },
    RuleResponse {
        key: "weight_loss",
        keywords: &["weight_loss", "weight loss", "lose weight", "fat loss", "perder peso", "adelgazar"],
        text: "Aim for a moderate daily energy deficit, build each plate around vegetables and lean protein, and keep ultra-processed snacks and sugary drinks occasional. Steady progress of about half a kilo per week is sustainable.",
    },
    RuleResponse {
        key: "muscle_gain",
        keywords: &["muscle_gain", "muscle", "strength", "hypertrophy", "ganar músculo"],
        text: "Spread protein over three or four meals (roughly 1.6 g per kg of body weight per day), eat enough total energy to support training, and prioritise progressive resistance training with adequate rest.",
    },
    RuleResponse {
        key: "vegetarian",
        keywords: &["vegetarian", "vegan", "plant-based", "plant based", "vegetariano"],
        text: "Combine legumes, whole grains, nuts and seeds to cover protein needs, include a reliable source of vitamin B12, and pair iron-rich foods with vitamin C to improve absorption.",
    },
    RuleResponse {
        key: "hydration",
        keywords: &["hydration", "hydrate", "water", "agua", "thirst"],
        text: "Drink water regularly through the day, around 30-35 ml per kg of body weight, and more when it is hot or you exercise. Pale yellow urine is a simple sign of good hydration.",
    },
    RuleResponse {
        key: "sleep",
        keywords: &["sleep", "insomnia", "sueño", "dormir"],
        text: "Keep regular sleep and wake times, avoid caffeine in the afternoon and large meals late at night, and aim for seven to nine hours of sleep.",
    },
    RuleResponse {
        key: "energy",
        keywords: &["energy", "tired", "fatigue", "energía", "cansado"],
        text: "Eat regular balanced meals, avoid long gaps without food, include complex carbohydrates and iron-rich foods, and check your hydration and sleep before changing anything else.",
    },
];

const FALLBACK_TEXT: &str = "Follow a varied diet rich in vegetables, fruit, whole grains and legumes, stay hydrated, keep active every day and consult a health professional for personalised guidance.";

const QUESTION_BANK: &[&str] = &[
    "How many main meals do you usually eat per day, and at what times?",
    "How many servings of fruit and vegetables do you eat on a typical day?",
    "How much water or other unsweetened drinks do you have per day?",
    "How often do you eat fast food or ultra-processed snacks each week?",
    "How many days per week do you do at least 30 minutes of physical activity?",
    "How many hours do you usually sleep per night?",
    "How would you rate your energy levels during the day, from 1 to 10?",
    "How often do you drink alcohol, and how much per occasion?",
    "Do you usually eat breakfast? If so, what does it typically include?",
    "Which protein sources do you eat most often?",
    "How often do you snack between meals, and what do you usually choose?",
    "How would you describe your stress levels and how they affect your eating?",
    "Do you have any digestive discomfort after certain foods?",
    "How often do you cook at home versus eating out?",
    "What has been the biggest obstacle when trying to change your eating habits?",
];

const MEALS: &[&str] = &["Breakfast", "Lunch", "Dinner", "Snack", "Snack", "Snack"];

const MEAL_ROTATION: &[&str] = &[
    "oat porridge with fruit and seeds",
    "wholegrain salad with legumes and olive oil",
    "grilled fish with roasted vegetables",
    "natural yogurt with nuts",
    "vegetable omelette with wholegrain toast",
    "lentil stew with brown rice",
    "chicken and vegetable stir-fry",
    "fruit and a handful of almonds",
];

const PLANT_ROTATION: &[&str] = &[
    "oat porridge with fruit and seeds",
    "chickpea and quinoa salad",
    "tofu and vegetable stir-fry",
    "soy yogurt with walnuts",
    "wholegrain toast with hummus and tomato",
    "lentil stew with brown rice",
    "black bean and vegetable tacos",
    "fruit and a handful of pumpkin seeds",
];

#[derive(Clone, Copy, Debug, Default)]
pub struct RuleBasedResponder;

impl RuleBasedResponder {
    /// The matching response key for `text`, or [`FALLBACK_KEY`].
    pub fn classify(text: &str) -> &'static str {
        match_rule(&text.to_lowercase()).map_or(FALLBACK_KEY, |rule| rule.key)
    }

    fn advice(context: &Value) -> (String, String) {
        let haystack = context.to_string().to_lowercase();
        match match_rule(&haystack) {
            Some(rule) => (rule.text.to_owned(), rule.key.to_owned()),
            None => (FALLBACK_TEXT.to_owned(), FALLBACK_KEY.to_owned()),
        }
    }

    fn question(number: usize, context: &Value) -> String {
        if let Some(question) = number.checked_sub(1).and_then(|index| QUESTION_BANK.get(index)) {
            return (*question).to_owned();
        }
        let goal = first_goal(context).unwrap_or_else(|| "health".to_owned());
        format!("Is there anything else about your {goal} goal that we should take into account? ({number})")
    }

    fn recommendations(context: &Value) -> String {
        let profile = context.get("profile").unwrap_or(context);
        let mut goals: Vec<String> = string_list(profile.get("goals"));
        if goals.is_empty() {
            goals.push("general wellbeing".to_owned());
        }

        let mut lines = vec!["Personalised recommendations based on your assessment:".to_owned()];
        let mut seen = Vec::new();
        for goal in &goals {
            let (text, key) = Self::advice(&Value::String(goal.clone()));
            if seen.contains(&key) {
                continue;
            }
            lines.push(format!("- {}: {text}", goal.replace('_', " ")));
            seen.push(key);
        }
        if let Some(activity) = profile.get("activityLevel").and_then(Value::as_str) {
            if matches!(activity, "sedentary" | "light") {
                lines.push("- activity: add a daily 20-30 minute walk and reduce long sitting periods.".to_owned());
            }
        }
        let allergies = string_list(profile.get("allergies"));
        if !allergies.is_empty() {
            lines.push(format!("- allergies: keep avoiding {} and check food labels.", allergies.join(", ")));
        }
        lines.join("\n")
    }

    fn meal_plan(days: u32, meals_per_day: u32, context: &Value) -> String {
        let haystack = context.to_string().to_lowercase();
        let plant_based = ["vegetarian", "vegan", "plant"].iter().any(|word| haystack.contains(word));
        let rotation = if plant_based { PLANT_ROTATION } else { MEAL_ROTATION };
        let meals_per_day = meals_per_day.clamp(1, MEALS.len() as u32) as usize;

        let mut lines = Vec::new();
        let mut slot = 0_usize;
        for day in 1..=days.max(1) {
            lines.push(format!("Day {day}:"));
            for meal in MEALS.iter().take(meals_per_day) {
                lines.push(format!("  {meal}: {}", rotation[slot % rotation.len()]));
                slot += 1;
            }
        }
        lines.join("\n")
    }

    fn progress(context: &Value) -> String {
        let entries = context.get("entries").and_then(Value::as_array);
        let weights: Vec<f64> = entries
            .map(|entries| {
                entries.iter().filter_map(|entry| entry.get("weight").and_then(Value::as_f64)).collect()
            })
            .unwrap_or_default();

        match (weights.first(), weights.last()) {
            (Some(first), Some(last)) if weights.len() > 1 => {
                let delta = last - first;
                let trend = if delta < -0.05 {
                    format!("down {:.1} kg", delta.abs())
                } else if delta > 0.05 {
                    format!("up {delta:.1} kg")
                } else {
                    "stable".to_owned()
                };
                format!(
                    "Across {} check-ins your weight is {trend}. Keep logging regularly and focus on consistent habits rather than day-to-day changes.",
                    weights.len()
                )
            }
            _ => "Log at least two check-ins with your weight to see a trend. Consistent habits matter more than day-to-day changes.".to_owned(),
        }
    }
}

fn match_rule(haystack: &str) -> Option<&'static RuleResponse> {
    RESPONSES.iter().find(|rule| rule.keywords.iter().any(|keyword| haystack.contains(keyword)))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

fn first_goal(context: &Value) -> Option<String> {
    let profile = context.get("profile").unwrap_or(context);
    string_list(profile.get("goals")).into_iter().next().map(|goal| goal.replace('_', " "))
}

#[async_trait]
impl InferenceProvider for RuleBasedResponder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RuleBased
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ProviderError> {
        let (text, model) = match &prompt.task {
            PromptTask::AssessmentQuestion { number, .. } => {
                (Self::question(*number, &prompt.context), QUESTION_BANK_MODEL.to_owned())
            }
            PromptTask::Recommendations => {
                (Self::recommendations(&prompt.context), RECOMMENDATIONS_MODEL.to_owned())
            }
            PromptTask::Advice => Self::advice(&prompt.context),
            PromptTask::MealPlan { days, meals_per_day } => {
                (Self::meal_plan(*days, *meals_per_day, &prompt.context), MEAL_PLAN_MODEL.to_owned())
            }
            PromptTask::ProgressReview => (Self::progress(&prompt.context), PROGRESS_MODEL.to_owned()),
        };
        Ok(Generation { text, model, provider: ProviderKind::RuleBased })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{RuleBasedResponder, FALLBACK_KEY, QUESTION_BANK_MODEL};
    use crate::llm::{InferenceProvider, Prompt, PromptTask};

    fn prompt(task: PromptTask, context: serde_json::Value) -> Prompt {
        Prompt { task, system: String::new(), user: String::new(), context }
    }

    #[test]
    fn classify_matches_keywords_in_order() {
        assert_eq!(RuleBasedResponder::classify("How can I LOSE WEIGHT fast?"), "weight_loss");
        assert_eq!(RuleBasedResponder::classify("tips for a vegan diet"), "vegetarian");
        assert_eq!(RuleBasedResponder::classify("what about taxes"), FALLBACK_KEY);
    }

    #[tokio::test]
    async fn advice_reports_the_matched_key_as_model() {
        let responder = RuleBasedResponder;
        let generated = responder
            .generate(&prompt(PromptTask::Advice, json!({ "question": "I feel tired all day" })))
            .await
            .expect("rule-based never fails");
        assert_eq!(generated.model, "energy");

        let fallback = responder
            .generate(&prompt(PromptTask::Advice, json!({ "question": "favourite colour?" })))
            .await
            .expect("rule-based never fails");
        assert_eq!(fallback.model, FALLBACK_KEY);
    }

    #[tokio::test]
    async fn question_bank_covers_long_assessments() {
        let responder = RuleBasedResponder;
        let first = responder
            .generate(&prompt(PromptTask::AssessmentQuestion { number: 1, total: 20 }, json!({})))
            .await
            .expect("question");
        assert_eq!(first.model, QUESTION_BANK_MODEL);
        assert!(first.text.ends_with('?'));

        let beyond = responder
            .generate(&prompt(
                PromptTask::AssessmentQuestion { number: 20, total: 20 },
                json!({ "profile": { "goals": ["muscle_gain"] } }),
            ))
            .await
            .expect("question");
        assert!(beyond.text.contains("muscle gain"));
    }

    #[tokio::test]
    async fn recommendations_follow_goals_and_allergies() {
        let responder = RuleBasedResponder;
        let generated = responder
            .generate(&prompt(
                PromptTask::Recommendations,
                json!({ "profile": {
                    "goals": ["weight_loss", "hydration"],
                    "activityLevel": "sedentary",
                    "allergies": ["peanuts"]
                } }),
            ))
            .await
            .expect("recommendations");

        assert!(generated.text.contains("weight loss:"));
        assert!(generated.text.contains("hydration:"));
        assert!(generated.text.contains("daily 20-30 minute walk"));
        assert!(generated.text.contains("peanuts"));
    }

    #[tokio::test]
    async fn meal_plan_has_one_block_per_day() {
        let responder = RuleBasedResponder;
        let generated = responder
            .generate(&prompt(
                PromptTask::MealPlan { days: 3, meals_per_day: 4 },
                json!({ "dietaryPreferences": ["vegan"] }),
            ))
            .await
            .expect("meal plan");

        assert_eq!(generated.text.matches("Day ").count(), 3);
        assert_eq!(generated.text.matches("Snack:").count(), 3);
        assert!(generated.text.contains("tofu"));
    }
}
