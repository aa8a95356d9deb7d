use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};

use super::question::Question;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access question store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("question store {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("question store {} has an invalid record {id}: {reason}", path.display())]
    InvalidRecord {
        path: PathBuf,
        id: String,
        reason: String,
    },

    #[error("failed to encode questions: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Owns every question and keeps the questions file in sync with memory.
///
/// All mutations go through methods that persist before returning, so a
/// successful call means the change survives a restart.
pub struct QuizManager {
    path: PathBuf,
    questions: Vec<Question>,
}

impl QuizManager {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut manager = Self {
            path: path.into(),
            questions: Vec::new(),
        };
        manager.load()?;
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn load(&mut self) -> Result<(), StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(
                    "No question store at {}, starting empty",
                    self.path.display()
                );
                self.questions.clear();
                return Ok(());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let questions: Vec<Question> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        if let Some(bad) = questions.iter().find(|q| q.times_correct > q.times_shown) {
            return Err(StoreError::InvalidRecord {
                path: self.path.clone(),
                id: bad.id.clone(),
                reason: format!(
                    "times_correct ({}) exceeds times_shown ({})",
                    bad.times_correct, bad.times_shown
                ),
            });
        }

        let mut seen = HashSet::new();
        self.questions = questions
            .into_iter()
            .filter(|q| {
                let fresh = seen.insert(q.id.clone());
                if !fresh {
                    warn!("Dropping duplicate question id {} from store", q.id);
                }
                fresh
            })
            .collect();

        info!(
            "Loaded {} questions from {}",
            self.questions.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Rewrites the whole store. The new content is written next to the
    /// target and renamed over it, so readers see either the old or the new file.
    pub fn save(&self) -> Result<(), StoreError> {
        let encoded = serde_json::to_string_pretty(&self.questions).map_err(StoreError::Encode)?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp_path, encoded).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;

        debug!(
            "Saved {} questions to {}",
            self.questions.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Appends `new` in order and persists. Questions whose id is already
    /// known are skipped. A failed save leaves the set as it was.
    pub fn add_questions(&mut self, new: Vec<Question>) -> Result<(), StoreError> {
        let old_len = self.questions.len();
        let mut known: HashSet<String> = self.questions.iter().map(|q| q.id.clone()).collect();
        for question in new {
            if !known.insert(question.id.clone()) {
                warn!("Skipping question with duplicate id {}", question.id);
                continue;
            }
            self.questions.push(question);
        }
        if let Err(err) = self.save() {
            self.questions.truncate(old_len);
            return Err(err);
        }
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.id == id)
    }

    /// Records an answer for question `id` and persists. `Ok(None)` when no
    /// such question exists. On a failed save the counters are restored.
    pub fn record_attempt(
        &mut self,
        id: &str,
        was_correct: bool,
    ) -> Result<Option<&Question>, StoreError> {
        let Some(idx) = self.position(id) else {
            return Ok(None);
        };
        let before = (self.questions[idx].times_shown, self.questions[idx].times_correct);
        self.questions[idx].record_attempt(was_correct);
        if let Err(err) = self.save() {
            let question = &mut self.questions[idx];
            (question.times_shown, question.times_correct) = before;
            return Err(err);
        }
        Ok(Some(&self.questions[idx]))
    }

    pub fn set_enabled(
        &mut self,
        id: &str,
        enabled: bool,
    ) -> Result<Option<&Question>, StoreError> {
        let Some(idx) = self.position(id) else {
            return Ok(None);
        };
        let before = self.questions[idx].enabled;
        self.questions[idx].enabled = enabled;
        if let Err(err) = self.save() {
            self.questions[idx].enabled = before;
            return Err(err);
        }
        Ok(Some(&self.questions[idx]))
    }

    pub fn toggle_enabled(&mut self, id: &str) -> Result<Option<&Question>, StoreError> {
        let Some(enabled) = self.find_by_id(id).map(|q| q.enabled) else {
            return Ok(None);
        };
        self.set_enabled(id, !enabled)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| q.enabled)
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled().count()
    }

    /// Practice-mode draw, weighted toward weak questions.
    pub fn select_weighted(&self) -> Option<&Question> {
        self.select_weighted_with(&mut thread_rng())
    }

    pub fn select_weighted_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Question> {
        self.select_practice_set_with(1, rng).pop()
    }

    /// `count` independent weighted draws; repeats are possible.
    pub fn select_practice_set(&self, count: usize) -> Vec<&Question> {
        self.select_practice_set_with(count, &mut thread_rng())
    }

    pub fn select_practice_set_with<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Vec<&Question> {
        let pool: Vec<&Question> = self.enabled().collect();
        if pool.is_empty() {
            return Vec::new();
        }

        // All-zero weights (every question mastered) fall back to uniform draws
        match WeightedIndex::new(pool.iter().map(|q| q.weight())) {
            Ok(dist) => (0..count).map(|_| pool[dist.sample(rng)]).collect(),
            Err(err) => {
                debug!("Weighted draw unavailable ({}), drawing uniformly", err);
                (0..count).filter_map(|_| pool.choose(rng).copied()).collect()
            }
        }
    }

    /// Test-mode draw: up to `count` distinct enabled questions in random order.
    pub fn select_unique_random(&self, count: usize) -> Vec<&Question> {
        self.select_unique_random_with(count, &mut thread_rng())
    }

    pub fn select_unique_random_with<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Vec<&Question> {
        let pool: Vec<&Question> = self.enabled().collect();
        let mut picked: Vec<&Question> = pool.choose_multiple(rng, count).copied().collect();
        picked.shuffle(rng);
        picked
    }

    pub fn select_random_single(&self) -> Option<&Question> {
        self.select_random_single_with(&mut thread_rng())
    }

    pub fn select_random_single_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Question> {
        let pool: Vec<&Question> = self.enabled().collect();
        pool.choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn store() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        (dir, path)
    }

    fn numbered(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::mcq(
                    "Math",
                    format!("Question {}", i),
                    "A",
                    vec!["A".into(), "B".into()],
                )
            })
            .collect()
    }

    #[test]
    fn missing_store_is_empty_and_round_trips() {
        let (_dir, path) = store();
        let manager = QuizManager::open(&path).unwrap();
        assert!(manager.questions().is_empty());

        manager.save().unwrap();
        let reopened = QuizManager::open(&path).unwrap();
        assert!(reopened.questions().is_empty());
    }

    #[test]
    fn malformed_store_is_an_error_and_left_untouched() {
        let (_dir, path) = store();
        fs::write(&path, "{ not json").unwrap();

        let err = QuizManager::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Malformed { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn record_with_more_correct_than_shown_is_rejected() {
        let (_dir, path) = store();
        fs::write(
            &path,
            r#"[{"id": "bad-1", "topic": "t", "text": "q", "type": "freeform",
                 "correct_answer": "a", "times_shown": 1, "times_correct": 5}]"#,
        )
        .unwrap();

        match QuizManager::open(&path) {
            Err(StoreError::InvalidRecord { id, .. }) => assert_eq!(id, "bad-1"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("store with broken counters was accepted"),
        }
    }

    #[test]
    fn failed_save_rolls_back_every_mutation() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        let questions = numbered(1);
        let id = questions[0].id.clone();
        manager.add_questions(questions).unwrap();

        // A directory in the way of the temp file makes every save fail
        fs::create_dir(path.with_file_name("questions.json.tmp")).unwrap();

        assert!(manager.record_attempt(&id, true).is_err());
        assert!(manager.set_enabled(&id, false).is_err());
        assert!(manager.toggle_enabled(&id).is_err());
        assert!(manager.add_questions(numbered(2)).is_err());

        let q = manager.find_by_id(&id).unwrap();
        assert_eq!((q.times_shown, q.times_correct), (0, 0));
        assert!(q.enabled);
        assert_eq!(manager.questions().len(), 1);

        let on_disk = QuizManager::open(&path).unwrap();
        assert_eq!(on_disk.questions(), manager.questions());
    }

    #[test]
    fn add_questions_persists_in_order() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();

        let q1 = Question::mcq("Math", "What is 2+2?", "4", vec!["3".into(), "4".into()]);
        let q2 = Question::freeform("History", "Who was Napoleon?", "Emperor");
        manager.add_questions(vec![q1.clone(), q2.clone()]).unwrap();

        assert_eq!(manager.questions().len(), 2);
        assert!(path.exists());

        let reopened = QuizManager::open(&path).unwrap();
        assert_eq!(reopened.questions(), &[q1, q2]);
    }

    #[test]
    fn duplicate_ids_are_not_added() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        let q = Question::freeform("t", "q", "a");

        manager.add_questions(vec![q.clone(), q.clone()]).unwrap();
        manager.add_questions(vec![q]).unwrap();
        assert_eq!(manager.questions().len(), 1);
    }

    #[test]
    fn find_by_id_hits_and_misses() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        let q = Question::mcq(
            "Science",
            "What is H2O?",
            "Water",
            vec!["Air".into(), "Water".into(), "Fire".into()],
        );
        let id = q.id.clone();
        manager.add_questions(vec![q]).unwrap();

        assert_eq!(manager.find_by_id(&id).unwrap().text, "What is H2O?");
        assert!(manager.find_by_id("fake-id-123").is_none());
    }

    #[test]
    fn mutators_persist_immediately() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        let questions = numbered(2);
        let id = questions[0].id.clone();
        manager.add_questions(questions).unwrap();

        manager.record_attempt(&id, true).unwrap();
        manager.record_attempt(&id, false).unwrap();
        let toggled = manager.toggle_enabled(&id).unwrap().unwrap();
        assert!(!toggled.enabled);

        let reopened = QuizManager::open(&path).unwrap();
        let q = reopened.find_by_id(&id).unwrap();
        assert_eq!((q.times_shown, q.times_correct), (2, 1));
        assert!(!q.enabled);
        assert_eq!(reopened.enabled_count(), 1);
    }

    #[test]
    fn mutators_on_unknown_id_do_nothing() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();

        assert!(manager.record_attempt("nope", true).unwrap().is_none());
        assert!(manager.set_enabled("nope", false).unwrap().is_none());
        assert!(manager.toggle_enabled("nope").unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn selection_on_empty_or_disabled_pool_is_none() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        assert!(manager.select_weighted().is_none());
        assert!(manager.select_random_single().is_none());
        assert!(manager.select_unique_random(3).is_empty());

        let questions = numbered(2);
        let ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        manager.add_questions(questions).unwrap();
        for id in &ids {
            manager.set_enabled(id, false).unwrap();
        }

        assert!(manager.select_weighted().is_none());
        assert!(manager.select_random_single().is_none());
        assert!(manager.select_unique_random(3).is_empty());
        assert!(manager.select_practice_set(3).is_empty());
    }

    #[test]
    fn unique_random_has_no_duplicates_and_exact_size() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        manager.add_questions(numbered(10)).unwrap();
        let disabled = manager.questions()[3].id.clone();
        manager.set_enabled(&disabled, false).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for count in 0..12 {
            let picked = manager.select_unique_random_with(count, &mut rng);
            assert_eq!(picked.len(), count.min(9));

            let ids: HashSet<&str> = picked.iter().map(|q| q.id.as_str()).collect();
            assert_eq!(ids.len(), picked.len());
            assert!(picked.iter().all(|q| q.enabled));
        }
    }

    #[test]
    fn unique_random_returns_shortfall_without_error() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        manager.add_questions(numbered(2)).unwrap();

        assert_eq!(manager.select_unique_random(5).len(), 2);
    }

    #[test]
    fn single_draws_never_return_disabled() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        manager.add_questions(numbered(4)).unwrap();
        let disabled: Vec<String> = manager.questions()[..2]
            .iter()
            .map(|q| q.id.clone())
            .collect();
        for id in &disabled {
            manager.set_enabled(id, false).unwrap();
        }

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let weighted = manager.select_weighted_with(&mut rng).unwrap();
            let single = manager.select_random_single_with(&mut rng).unwrap();
            assert!(weighted.enabled);
            assert!(single.enabled);
        }
    }

    #[test]
    fn weighted_draw_skips_mastered_question() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        let questions = numbered(3);
        let ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        manager.add_questions(questions).unwrap();

        // 0%, 50% and 100% correct
        manager.record_attempt(&ids[1], true).unwrap();
        manager.record_attempt(&ids[1], false).unwrap();
        manager.record_attempt(&ids[2], true).unwrap();

        let weights: Vec<f64> = manager.questions().iter().map(Question::weight).collect();
        assert_eq!(weights, vec![100.0, 50.0, 0.0]);

        let mut rng = StdRng::seed_from_u64(1);
        let mut hits = [0usize; 3];
        for _ in 0..1000 {
            let q = manager.select_weighted_with(&mut rng).unwrap();
            let idx = ids.iter().position(|id| *id == q.id).unwrap();
            hits[idx] += 1;
        }
        assert_eq!(hits[2], 0);
        assert!(hits[0] > hits[1]);
    }

    #[test]
    fn fully_mastered_pool_falls_back_to_uniform() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        let questions = numbered(3);
        let ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        manager.add_questions(questions).unwrap();
        for id in &ids {
            manager.record_attempt(id, true).unwrap();
        }

        let mut rng = StdRng::seed_from_u64(3);
        let drawn: HashSet<String> = (0..200)
            .map(|_| manager.select_weighted_with(&mut rng).unwrap().id.clone())
            .collect();
        assert_eq!(drawn.len(), 3);
    }

    #[test]
    fn practice_set_draws_with_replacement() {
        let (_dir, path) = store();
        let mut manager = QuizManager::open(&path).unwrap();
        manager.add_questions(numbered(2)).unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let set = manager.select_practice_set_with(10, &mut rng);
        assert_eq!(set.len(), 10);
    }
}
