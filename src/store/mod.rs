//! Flat persisted state for the companion: everything here is an
//! append/prune structure with an explicit cap — no unbounded growth.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serialization(String),
}

const MAX_RITUAL_HISTORY: usize = 30;
const MAX_RECENT_TOOLS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RitualCompletion {
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub ritual_id: String,
    pub segments_played: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerseProgress {
    pub attempts: u32,
    pub best_score: f32,
    pub last_practiced: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    ritual_history: Vec<RitualCompletion>,
    recent_tools: Vec<String>,
    verse_progress: HashMap<String, VerseProgress>,
}

/// File-backed JSON snapshot. Loads lazily (a missing file is an empty
/// store) and saves after every mutation.
pub struct CompanionStore {
    path: PathBuf,
    data: StoreData,
}

impl CompanionStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: StoreData::default(),
        }
    }

    pub fn load(&mut self) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(&self.path)?;
        self.data =
            serde_json::from_str(&content).map_err(|e| StoreError::Serialization(e.to_string()))?;
        debug!(
            "store loaded: {} ritual completions, {} recent tools",
            self.data.ritual_history.len(),
            self.data.recent_tools.len()
        );
        Ok(())
    }

    fn save(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn record_ritual_completion(
        &mut self,
        completion: RitualCompletion,
    ) -> Result<(), StoreError> {
        self.data.ritual_history.push(completion);
        let excess = self.data.ritual_history.len().saturating_sub(MAX_RITUAL_HISTORY);
        if excess > 0 {
            self.data.ritual_history.drain(..excess);
        }
        self.save()
    }

    pub fn ritual_history(&self) -> &[RitualCompletion] {
        &self.data.ritual_history
    }

    pub fn completions_on(&self, date: &str) -> Vec<&RitualCompletion> {
        self.data
            .ritual_history
            .iter()
            .filter(|c| c.date == date)
            .collect()
    }

    /// Most recent first. Re-suggesting an already-listed tool moves it to
    /// the front rather than duplicating it.
    pub fn note_tool_suggested(&mut self, tool_id: &str) -> Result<(), StoreError> {
        self.data.recent_tools.retain(|id| id != tool_id);
        self.data.recent_tools.insert(0, tool_id.to_string());
        self.data.recent_tools.truncate(MAX_RECENT_TOOLS);
        self.save()
    }

    pub fn recent_tools(&self) -> &[String] {
        &self.data.recent_tools
    }

    pub fn update_verse_progress(
        &mut self,
        verse_id: &str,
        score: f32,
        practiced_on: &str,
    ) -> Result<(), StoreError> {
        let entry = self
            .data
            .verse_progress
            .entry(verse_id.to_string())
            .or_insert(VerseProgress {
                attempts: 0,
                best_score: 0.0,
                last_practiced: String::new(),
            });
        entry.attempts += 1;
        entry.best_score = entry.best_score.max(score);
        entry.last_practiced = practiced_on.to_string();
        self.save()
    }

    pub fn verse_progress(&self, verse_id: &str) -> Option<&VerseProgress> {
        self.data.verse_progress.get(verse_id)
    }
}
