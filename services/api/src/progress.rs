use crate::ragtools::is_valid_key;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::Mutex;

pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("invalid user id '{0}'")]
    InvalidUserId(String),
    #[error("unknown difficulty '{0}', expected easy, medium or hard")]
    InvalidDifficulty(String),
    #[error("failed to access progress file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("progress file {} is corrupt", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl FromStr for Difficulty {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ProgressError::InvalidDifficulty(s.to_string())),
        }
    }
}

/// One value per difficulty level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerDifficulty<T> {
    pub easy: T,
    pub medium: T,
    pub hard: T,
}

impl<T> PerDifficulty<T> {
    fn get_mut(&mut self, difficulty: Difficulty) -> &mut T {
        match difficulty {
            Difficulty::Easy => &mut self.easy,
            Difficulty::Medium => &mut self.medium,
            Difficulty::Hard => &mut self.hard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: NaiveDateTime,
    pub question: String,
    pub answer: String,
    pub difficulty: Difficulty,
    pub is_correct: bool,
}

/// Aggregated statistics for one user. Accuracies are percentages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total_questions: u32,
    pub correct_answers: u32,
    pub accuracy: f64,
    pub difficulty_breakdown: PerDifficulty<u32>,
    pub accuracy_by_difficulty: PerDifficulty<f64>,
}

/// On-disk format of `<user_id>.json`.
#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    user_id: String,
    total_questions: u32,
    correct_answers: u32,
    difficulty_stats: PerDifficulty<u32>,
    correct_by_difficulty: PerDifficulty<u32>,
    interactions: Vec<Interaction>,
}

impl UserRecord {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_questions: 0,
            correct_answers: 0,
            difficulty_stats: PerDifficulty::default(),
            correct_by_difficulty: PerDifficulty::default(),
            interactions: Vec::new(),
        }
    }

    fn summary(&self) -> ProgressSummary {
        let stats = &self.difficulty_stats;
        let correct = &self.correct_by_difficulty;
        ProgressSummary {
            total_questions: self.total_questions,
            correct_answers: self.correct_answers,
            accuracy: percent(self.correct_answers, self.total_questions),
            difficulty_breakdown: *stats,
            accuracy_by_difficulty: PerDifficulty {
                easy: percent(correct.easy, stats.easy),
                medium: percent(correct.medium, stats.medium),
                hard: percent(correct.hard, stats.hard),
            },
        }
    }
}

fn percent(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(total) * 100.0
    }
}

/// Learning progress stored as one JSON file per user.
pub struct ProgressTracker {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ProgressTracker {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ProgressError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| ProgressError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Records one judged answer and returns the stored interaction.
    pub async fn save_interaction(
        &self,
        user_id: &str,
        question: &str,
        answer: &str,
        difficulty: Difficulty,
        is_correct: bool,
    ) -> Result<Interaction, ProgressError> {
        let path = self.user_file(user_id)?;
        let _guard = self.lock.lock().await;

        let mut record = read_record(&path)
            .await?
            .unwrap_or_else(|| UserRecord::new(user_id));

        record.total_questions += 1;
        *record.difficulty_stats.get_mut(difficulty) += 1;
        if is_correct {
            record.correct_answers += 1;
            *record.correct_by_difficulty.get_mut(difficulty) += 1;
        }
        let interaction = Interaction {
            timestamp: Local::now().naive_local(),
            question: question.to_string(),
            answer: answer.to_string(),
            difficulty,
            is_correct,
        };
        record.interactions.push(interaction.clone());

        let json = serde_json::to_vec_pretty(&record).map_err(|source| ProgressError::Corrupt {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| ProgressError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            "recorded {:?} answer for {} (correct: {})",
            difficulty,
            user_id,
            is_correct
        );
        Ok(interaction)
    }

    /// Statistics for `user_id`; all zeros for a user with no history.
    pub async fn progress(&self, user_id: &str) -> Result<ProgressSummary, ProgressError> {
        let path = self.user_file(user_id)?;
        let _guard = self.lock.lock().await;
        let record = read_record(&path)
            .await?
            .unwrap_or_else(|| UserRecord::new(user_id));
        Ok(record.summary())
    }

    /// The last `limit` interactions, oldest first.
    pub async fn recent_interactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>, ProgressError> {
        let path = self.user_file(user_id)?;
        let _guard = self.lock.lock().await;
        let Some(mut record) = read_record(&path).await? else {
            return Ok(Vec::new());
        };
        let skip = record.interactions.len().saturating_sub(limit);
        Ok(record.interactions.split_off(skip))
    }

    fn user_file(&self, user_id: &str) -> Result<PathBuf, ProgressError> {
        if !is_valid_key(user_id) {
            return Err(ProgressError::InvalidUserId(user_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", user_id)))
    }
}

async fn read_record(path: &Path) -> Result<Option<UserRecord>, ProgressError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ProgressError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| ProgressError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}
