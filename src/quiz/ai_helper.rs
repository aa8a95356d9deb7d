use chatgpt::client::ChatGPT;
use chatgpt::types::CompletionResponse;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::quiz::grading;
use crate::quiz::question::{Question, QuestionSource, QuestionType};

#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    #[error("ChatGPT request failed: {0}")]
    ChatGpt(#[from] chatgpt::err::Error),

    #[error("model output is not a JSON array: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Talks to the language model: writes new questions and grades freeform answers.
///
/// Both operations absorb their failures. Generation yields an empty list and
/// grading yields "incorrect", so the quiz flow never has to handle API errors.
pub struct QuizHelper {
    chat_gpt: ChatGPT,
}

impl QuizHelper {
    pub fn new(chat_gpt: ChatGPT) -> Self {
        Self { chat_gpt }
    }

    pub async fn generate_questions(&self, topic: &str, count: usize) -> Vec<Question> {
        match self.request_questions(topic, count).await {
            Ok(questions) => questions,
            Err(err) => {
                warn!("Question generation for {:?} failed: {}", topic, err);
                Vec::new()
            }
        }
    }

    async fn request_questions(
        &self,
        topic: &str,
        count: usize,
    ) -> Result<Vec<Question>, HelperError> {
        debug!("Generating {} questions about {:?}", count, topic);
        let prompt = format!(
            "You are a helpful study assistant that writes educational questions.
        Generate {count} study questions about {topic}.
        Return ONLY a JSON array with this exact format (no other text):
        [
            {{\"text\": \"question text here\", \"type\": \"mcq\", \"correct_answer\": \"correct option\", \"options\": [\"option1\", \"option2\", \"option3\", \"option4\"]}},
            {{\"text\": \"question text here\", \"type\": \"freeform\", \"correct_answer\": \"answer here\", \"options\": null}}
        ]
        For mcq questions the correct_answer must be the exact text of one of the options.
        Mix mcq and freeform questions. Make them challenging and educational."
        );

        let response: CompletionResponse = self.chat_gpt.send_message(&prompt).await?;
        let content = response.message().clone().content;

        debug!("Completion: {:?}", content);

        let mut questions = parse_generated_questions(topic, &content)?;
        questions.truncate(count);
        Ok(questions)
    }

    /// MCQ answers are checked locally; freeform answers go to the model.
    pub async fn evaluate_answer(&self, question: &Question, answer: &str) -> bool {
        match question.question_type {
            QuestionType::Mcq => grading::is_mcq_answer_correct(question, answer),
            QuestionType::Freeform => {
                if answer.trim().is_empty() {
                    return false;
                }
                match self.request_verdict(question, answer).await {
                    Ok(verdict) => verdict,
                    Err(err) => {
                        warn!("Grading question {} failed: {}", question.id, err);
                        false
                    }
                }
            }
        }
    }

    async fn request_verdict(&self, question: &Question, answer: &str) -> Result<bool, HelperError> {
        let prompt = format!(
            "You are a helpful study assistant grading a student's answer.
        Question: {}
        Correct answer: {}
        Student's answer: {}
        Is the student's answer correct and relevant?
        Respond with exactly one word: \"correct\" or \"incorrect\".",
            question.text, question.correct_answer, answer
        );

        let response: CompletionResponse = self.chat_gpt.send_message(&prompt).await?;
        let content = response.message().clone().content;

        debug!("Verdict for {}: {:?}", question.id, content);

        Ok(parse_verdict(&content))
    }
}

#[derive(Deserialize)]
struct GeneratedQuestion {
    text: String,
    #[serde(rename = "type")]
    question_type: QuestionType,
    correct_answer: String,
    #[serde(default)]
    options: Option<Vec<String>>,
}

/// Turns raw model output into questions on `topic`.
///
/// The array may be wrapped in prose or a code fence. Entries that don't
/// describe a usable question are dropped one by one.
pub fn parse_generated_questions(
    topic: &str,
    content: &str,
) -> Result<Vec<Question>, serde_json::Error> {
    let raw = match (array_start(content), content.rfind(']')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    };
    let items: Vec<Value> = serde_json::from_str(raw)?;

    let questions = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<GeneratedQuestion>(item) {
            Ok(generated) => into_question(topic, generated),
            Err(err) => {
                warn!("Skipping malformed generated question: {}", err);
                None
            }
        })
        .collect();
    Ok(questions)
}

/// Start of the question array: the first `[` that opens an object list, so a
/// bracketed aside like "[5]" in the model's prose is passed over.
fn array_start(content: &str) -> Option<usize> {
    content
        .match_indices('[')
        .map(|(idx, _)| idx)
        .find(|&idx| content[idx + 1..].trim_start().starts_with('{'))
        .or_else(|| content.find('['))
}

fn into_question(topic: &str, generated: GeneratedQuestion) -> Option<Question> {
    let text = generated.text.trim();
    let correct_answer = generated.correct_answer.trim();
    if text.is_empty() || correct_answer.is_empty() {
        warn!("Skipping generated question with empty text or answer");
        return None;
    }

    let options = match generated.question_type {
        QuestionType::Mcq => match generated.options {
            Some(options) if !options.is_empty() => {
                if !options.iter().any(|option| option.trim() == correct_answer) {
                    warn!("Skipping generated mcq whose answer is not an option: {:?}", text);
                    return None;
                }
                Some(options)
            }
            _ => {
                warn!("Skipping generated mcq without options: {:?}", text);
                return None;
            }
        },
        QuestionType::Freeform => None,
    };

    Some(Question::new(
        topic,
        text,
        generated.question_type,
        correct_answer,
        options,
        QuestionSource::Generated,
    ))
}

/// Reads the model's one-word verdict. Anything but a leading "correct" is a miss.
pub fn parse_verdict(content: &str) -> bool {
    content
        .split(|c: char| !c.is_alphabetic())
        .find(|word| !word.is_empty())
        .is_some_and(|word| word.eq_ignore_ascii_case("correct"))
}
