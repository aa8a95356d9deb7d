use std::collections::BTreeMap;
use std::fmt;

use super::question::Question;

#[derive(Debug, Clone, PartialEq)]
pub struct TopicStats {
    pub topic: String,
    pub total: usize,
    pub enabled: usize,
    pub attempted: usize,
    /// Mean success rate over attempted questions; `None` if none were attempted.
    pub average_success: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub enabled: usize,
    pub attempted: usize,
    pub topics: Vec<TopicStats>,
}

pub fn summarize(questions: &[Question]) -> Summary {
    let mut by_topic: BTreeMap<&str, Vec<&Question>> = BTreeMap::new();
    for q in questions {
        by_topic.entry(q.topic.as_str()).or_default().push(q);
    }

    let topics = by_topic
        .into_iter()
        .map(|(topic, qs)| {
            let shown: Vec<&&Question> = qs.iter().filter(|q| q.times_shown > 0).collect();
            let average_success = if shown.is_empty() {
                None
            } else {
                let sum: f64 = shown.iter().map(|q| q.correct_percentage()).sum();
                Some(sum / shown.len() as f64)
            };
            TopicStats {
                topic: topic.to_string(),
                total: qs.len(),
                enabled: qs.iter().filter(|q| q.enabled).count(),
                attempted: shown.len(),
                average_success,
            }
        })
        .collect();

    Summary {
        total: questions.len(),
        enabled: questions.iter().filter(|q| q.enabled).count(),
        attempted: questions.iter().filter(|q| q.times_shown > 0).count(),
        topics,
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total questions: {}\nEnabled: {}\nAttempted: {}\nTopics: {}",
            self.total,
            self.enabled,
            self.attempted,
            self.topics.len()
        )?;
        for topic in &self.topics {
            write!(
                f,
                "\n{}: {} questions ({} enabled)",
                topic.topic, topic.total, topic.enabled
            )?;
            match topic.average_success {
                Some(avg) => write!(
                    f,
                    "\n  Average success rate: {:.1}%\n  Questions attempted: {}/{}",
                    avg, topic.attempted, topic.total
                )?,
                None => write!(f, "\n  No questions attempted yet.")?,
            }
        }
        Ok(())
    }
}
