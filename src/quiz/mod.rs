pub mod ai_helper;
pub mod grading;
pub mod manager;
pub mod question;
pub mod results;
pub mod stats;

use manager::QuizManager;
use question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QuizMode {
    /// Weighted draws with replacement, biased toward weak questions.
    Practice,
    /// Distinct uniform draws; the final score is logged.
    Test,
}

impl QuizMode {
    pub fn draw(self, manager: &QuizManager, count: usize) -> Vec<&Question> {
        match self {
            QuizMode::Practice => manager.select_practice_set(count),
            QuizMode::Test => manager.select_unique_random(count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SessionStatus {
    InProgress { index: usize, score: usize },
    Complete { score: usize, total: usize },
}

/// One quiz run. The question list is fixed when the session starts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuizSession {
    mode: QuizMode,
    question_ids: Vec<String>,
    status: SessionStatus,
}

impl QuizSession {
    /// Draws up to `count` questions for `mode`. `None` when nothing can be drawn.
    pub fn start(mode: QuizMode, manager: &QuizManager, count: usize) -> Option<Self> {
        let ids = mode
            .draw(manager, count)
            .into_iter()
            .map(|q| q.id.clone())
            .collect();
        Self::from_ids(mode, ids)
    }

    pub fn from_ids(mode: QuizMode, question_ids: Vec<String>) -> Option<Self> {
        if question_ids.is_empty() {
            return None;
        }
        Some(Self {
            mode,
            question_ids,
            status: SessionStatus::InProgress { index: 0, score: 0 },
        })
    }

    pub fn mode(&self) -> QuizMode {
        self.mode
    }

    pub fn total(&self) -> usize {
        self.question_ids.len()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, SessionStatus::Complete { .. })
    }

    /// 0-based position of the question awaiting an answer.
    pub fn index(&self) -> Option<usize> {
        match self.status {
            SessionStatus::InProgress { index, .. } => Some(index),
            SessionStatus::Complete { .. } => None,
        }
    }

    pub fn current_question_id(&self) -> Option<&str> {
        self.index()
            .and_then(|idx| self.question_ids.get(idx))
            .map(String::as_str)
    }

    /// Moves past the current question, counting it toward the score iff `correct`.
    pub fn submit(&mut self, correct: bool) -> &SessionStatus {
        self.advance(usize::from(correct))
    }

    /// Moves past a question that no longer exists. It still counts toward the total.
    pub fn skip(&mut self) -> &SessionStatus {
        self.advance(0)
    }

    fn advance(&mut self, gained: usize) -> &SessionStatus {
        if let SessionStatus::InProgress { index, score } = self.status {
            let (index, score) = (index + 1, score + gained);
            self.status = if index >= self.question_ids.len() {
                SessionStatus::Complete {
                    score,
                    total: self.question_ids.len(),
                }
            } else {
                SessionStatus::InProgress { index, score }
            };
        }
        &self.status
    }
}
