use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::AppConfig;
use crate::extract::{GeminiExtractor, StatExtractor};
use crate::ledger::Ledger;
use crate::power::PowerBoard;
use crate::Result;

/// Shared handler state. Cloning is cheap; everything sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    /// One calculator session for the whole process.
    pub board: Arc<Mutex<PowerBoard>>,
    pub extractor: Arc<dyn StatExtractor>,
}

impl AppState {
    pub fn new(config: &AppConfig, extractor: Arc<dyn StatExtractor>) -> Self {
        Self {
            ledger: Arc::new(Ledger::from_config(config)),
            board: Arc::new(Mutex::new(PowerBoard::new(config.multipliers))),
            extractor,
        }
    }

    /// State wired to the real Gemini client.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let extractor = GeminiExtractor::new(&config.extract)?;
        Ok(Self::new(config, Arc::new(extractor)))
    }

    pub fn board(&self) -> MutexGuard<'_, PowerBoard> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
