//! Ranking weights with hot-reload from `config/ranking_weights.json`.
//!
//! JSON shape (every field optional, missing ones keep their default):
//! {
//!   "topic": 0.40,
//!   "source": 0.20,
//!   "content_type": 0.15,
//!   "importance": 0.15,
//!   "author": 0.10
//! }
//!
//! `current()` compares the file's modified time with the last load and reloads
//! when it changed. A missing or unreadable file keeps the last good weights.

use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::SystemTime,
};
use tracing::{info, warn};

pub const DEFAULT_WEIGHTS_PATH: &str = "config/ranking_weights.json";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub topic: f32,
    pub source: f32,
    pub content_type: f32,
    pub importance: f32,
    pub author: f32,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            topic: 0.40,
            source: 0.20,
            content_type: 0.15,
            importance: 0.15,
            author: 0.10,
        }
    }
}

impl RankingWeights {
    /// Negative or non-finite weights become 0. If nothing positive is left the
    /// defaults are used.
    pub fn sanitized(self) -> Self {
        fn w(x: f32) -> f32 {
            if x.is_finite() {
                x.max(0.0)
            } else {
                0.0
            }
        }
        let out = Self {
            topic: w(self.topic),
            source: w(self.source),
            content_type: w(self.content_type),
            importance: w(self.importance),
            author: w(self.author),
        };
        if out.sum() > 0.0 && out.sum().is_finite() {
            out
        } else {
            Self::default()
        }
    }

    pub fn sum(&self) -> f32 {
        self.topic + self.source + self.content_type + self.importance + self.author
    }
}

/// Hot-reload wrapper: reloads when the weights file mtime changes.
#[derive(Debug)]
pub struct HotReloadWeights {
    path: PathBuf,
    inner: RwLock<State>,
}

#[derive(Debug)]
struct State {
    weights: RankingWeights,
    last_modified: Option<SystemTime>,
}

impl HotReloadWeights {
    /// `path` defaults to [`DEFAULT_WEIGHTS_PATH`]; `base` is served until the
    /// file first appears.
    pub fn new(path: Option<&Path>, base: RankingWeights) -> Self {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_PATH));
        Self {
            path,
            inner: RwLock::new(State {
                weights: base.sanitized(),
                last_modified: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> RankingWeights {
        let mtime = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => return self.read_state().weights,
        };
        {
            let state = self.read_state();
            if state.last_modified == Some(mtime) {
                return state.weights;
            }
        }

        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // another caller may have reloaded meanwhile
        if state.last_modified == Some(mtime) {
            return state.weights;
        }
        match load_weights_file(&self.path) {
            Ok(w) => {
                state.weights = w;
                info!(target: "rank", path = %self.path.display(), ?w, "ranking weights reloaded");
            }
            Err(e) => {
                warn!(target: "rank", path = %self.path.display(), error = %e, "ranking weights file rejected; keeping previous");
            }
        }
        // remember the mtime either way so a broken file is not re-parsed per call
        state.last_modified = Some(mtime);
        state.weights
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Load weights directly (no caching).
pub fn load_weights_file(path: &Path) -> io::Result<RankingWeights> {
    let bytes = fs::read(path)?;
    let w: RankingWeights = serde_json::from_slice(&bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(w.sanitized())
}
