use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Mcq,
    Freeform,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::Freeform => "freeform",
        }
    }
}

/// Where a question came from. Informational only, selection never looks at it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    Generated,
    #[default]
    Manual,
}

/// A single study item together with its attempt statistics.
///
/// The serialized form is the record stored in the questions file. Legacy or
/// hand-written records may omit the statistics, `options` and `source`;
/// those fall back to an enabled, never-shown, manually-added question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default = "new_question_id")]
    pub id: String,
    pub topic: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub correct_answer: String,
    /// `null` means "no options" (freeform); a missing key reads as an empty list.
    #[serde(default = "empty_options")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub source: QuestionSource,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub times_shown: u32,
    #[serde(default)]
    pub times_correct: u32,
}

fn new_question_id() -> String {
    Uuid::new_v4().to_string()
}

fn empty_options() -> Option<Vec<String>> {
    Some(Vec::new())
}

fn enabled_by_default() -> bool {
    true
}

impl Question {
    pub fn new(
        topic: impl Into<String>,
        text: impl Into<String>,
        question_type: QuestionType,
        correct_answer: impl Into<String>,
        options: Option<Vec<String>>,
        source: QuestionSource,
    ) -> Self {
        Self {
            id: new_question_id(),
            topic: topic.into(),
            text: text.into(),
            question_type,
            correct_answer: correct_answer.into(),
            options,
            source,
            enabled: true,
            times_shown: 0,
            times_correct: 0,
        }
    }

    pub fn mcq(
        topic: impl Into<String>,
        text: impl Into<String>,
        correct_answer: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        Self::new(
            topic,
            text,
            QuestionType::Mcq,
            correct_answer,
            Some(options),
            QuestionSource::Manual,
        )
    }

    pub fn freeform(
        topic: impl Into<String>,
        text: impl Into<String>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self::new(
            topic,
            text,
            QuestionType::Freeform,
            correct_answer,
            None,
            QuestionSource::Manual,
        )
    }

    pub fn with_source(mut self, source: QuestionSource) -> Self {
        self.source = source;
        self
    }

    /// Options as a slice; empty for freeform questions.
    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or_default()
    }

    pub fn record_attempt(&mut self, was_correct: bool) {
        self.times_shown += 1;
        if was_correct {
            self.times_correct += 1;
        }
    }

    /// Share of correct answers in `[0, 100]`; `0.0` for a question never shown.
    pub fn correct_percentage(&self) -> f64 {
        if self.times_shown == 0 {
            return 0.0;
        }
        f64::from(self.times_correct) / f64::from(self.times_shown) * 100.0
    }

    /// Practice-mode sampling weight. Never negative.
    pub fn weight(&self) -> f64 {
        (100.0 - self.correct_percentage()).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_mcq() -> Question {
        Question::mcq(
            "Math",
            "What is 2+2?",
            "4",
            vec!["3".into(), "4".into(), "5".into(), "6".into()],
        )
    }

    #[test]
    fn new_question_starts_enabled_and_unattempted() {
        let q = sample_mcq();
        assert!(q.enabled);
        assert_eq!(q.times_shown, 0);
        assert_eq!(q.times_correct, 0);
        assert_eq!(q.source, QuestionSource::Manual);
        assert_eq!(q.correct_percentage(), 0.0);
        assert_eq!(q.weight(), 100.0);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(sample_mcq().id, sample_mcq().id);
    }

    #[test]
    fn record_attempt_updates_counters() {
        let mut q = Question::mcq("Math", "What is 1+1?", "2", vec!["1".into(), "2".into()]);

        q.record_attempt(true);
        assert_eq!((q.times_shown, q.times_correct), (1, 1));

        q.record_attempt(false);
        assert_eq!((q.times_shown, q.times_correct), (2, 1));
        assert_eq!(q.correct_percentage(), 50.0);
        assert_eq!(q.weight(), 50.0);
    }

    #[test]
    fn counters_stay_consistent_over_any_sequence() {
        let outcomes = [true, false, false, true, true, false, true, true, false];
        let mut q = Question::freeform("History", "Who was Napoleon?", "French emperor");

        for (n, &correct) in outcomes.iter().enumerate() {
            q.record_attempt(correct);
            assert!(q.times_correct <= q.times_shown);
            assert_eq!(q.times_shown as usize, n + 1);
        }

        let k = outcomes.iter().filter(|&&c| c).count() as f64;
        let expected = 100.0 * k / outcomes.len() as f64;
        assert!((q.correct_percentage() - expected).abs() < 1e-9);
    }

    #[test]
    fn always_correct_question_has_zero_weight() {
        let mut q = sample_mcq();
        q.record_attempt(true);
        q.record_attempt(true);
        assert_eq!(q.correct_percentage(), 100.0);
        assert_eq!(q.weight(), 0.0);
    }

    #[test]
    fn serializes_with_store_field_names() {
        let q = Question::freeform("History", "Who was Napoleon?", "French emperor");
        let value = serde_json::to_value(&q).unwrap();

        assert_eq!(value["type"], "freeform");
        assert_eq!(value["source"], "manual");
        assert_eq!(value["enabled"], true);
        assert!(value["options"].is_null());
    }

    #[test]
    fn round_trip_preserves_statistics() {
        let mut mcq = sample_mcq().with_source(QuestionSource::Generated);
        mcq.record_attempt(true);
        mcq.record_attempt(false);
        mcq.enabled = false;

        let mut freeform = Question::freeform("Python", "What is a list?", "A mutable sequence");
        freeform.record_attempt(true);

        for q in [mcq, freeform] {
            let encoded = serde_json::to_string(&q).unwrap();
            let decoded: Question = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, q);
        }
    }

    #[test]
    fn legacy_record_gets_defaults() {
        let decoded: Question = serde_json::from_str(
            r#"{
                "id": "abc-123",
                "topic": "Science",
                "text": "What is H2O?",
                "type": "mcq",
                "correct_answer": "Water"
            }"#,
        )
        .unwrap();

        assert_eq!(decoded.id, "abc-123");
        assert!(decoded.enabled);
        assert_eq!(decoded.times_shown, 0);
        assert_eq!(decoded.times_correct, 0);
        assert_eq!(decoded.options, Some(Vec::new()));
        assert_eq!(decoded.source, QuestionSource::Manual);
    }

    #[test]
    fn record_without_id_gets_a_fresh_one() {
        let decoded: Question = serde_json::from_str(
            r#"{"topic": "t", "text": "q", "type": "freeform", "correct_answer": "a", "options": null}"#,
        )
        .unwrap();

        assert!(!decoded.id.is_empty());
        assert_eq!(decoded.options, None);
        assert!(decoded.options().is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<Question>(
            r#"{"topic": "t", "text": "q", "type": "essay", "correct_answer": "a"}"#,
        );
        assert!(result.is_err());
    }
}
