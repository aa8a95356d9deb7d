use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log of finished test-mode sessions.
pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, score: usize, total: usize) -> io::Result<()> {
        self.append_at(Local::now().naive_local(), score, total)
    }

    pub fn append_at(&self, at: NaiveDateTime, score: usize, total: usize) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", format_entry(at, score, total))?;
        log::info!("Logged test result {}/{} to {}", score, total, self.path.display());
        Ok(())
    }
}

pub fn format_entry(at: NaiveDateTime, score: usize, total: usize) -> String {
    format!("{} - Score: {}/{}", at.format(TIMESTAMP_FORMAT), score, total)
}
