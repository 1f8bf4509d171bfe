//! Optional score sink: best score kept on disk (XDG config or ~/.config/puyotui).
//!
//! Writes happen on a background thread; the game never waits on them and
//! failures are only logged. Dropping the sink waits for pending writes.

use crate::game::ScoreEvent;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, warn};

const FILENAME: &str = "highscore";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid score: {0:?}")]
    Parse(String),
}

/// Receives score events from the host. Must return immediately.
pub trait ScoreSink {
    fn notify(&self, event: ScoreEvent);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ScoreSink for NullSink {
    fn notify(&self, _event: ScoreEvent) {}
}

/// Path to the best-score file (config dir / puyotui / highscore).
pub fn default_path() -> PathBuf {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".config"))
            .unwrap_or_else(|_| PathBuf::from(".")),
    };
    base.join("puyotui").join(FILENAME)
}

/// Read the stored best score. Missing file counts as 0.
pub fn load_best(path: &Path) -> Result<u32, PersistError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let line = content.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(0);
    }
    line.parse::<u32>()
        .map_err(|_| PersistError::Parse(line.to_string()))
}

/// Write the best score, creating the config directory if needed.
/// The old file stays intact until the new one is complete.
pub fn save_best(path: &Path, best: u32) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut f = fs::File::create(&tmp)?;
    writeln!(f, "{}", best)?;
    f.sync_all()?;
    drop(f);
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Keeps the best score file up to date from game-over events.
#[derive(Debug)]
pub struct FileSink {
    tx: Option<Sender<ScoreEvent>>,
    writer: Option<JoinHandle<()>>,
}

impl FileSink {
    /// Start the writer thread. `best` is the score already on disk.
    pub fn spawn(path: PathBuf, best: u32) -> Self {
        let (tx, rx) = mpsc::channel::<ScoreEvent>();
        let writer = thread::spawn(move || {
            let mut best = best;
            for event in rx {
                let ScoreEvent::GameOver { score, .. } = event else {
                    continue;
                };
                if score <= best {
                    continue;
                }
                best = score;
                match save_best(&path, best) {
                    Ok(()) => debug!(best, path = %path.display(), "saved best score"),
                    Err(e) => warn!(error = %e, "could not save best score"),
                }
            }
        });
        Self {
            tx: Some(tx),
            writer: Some(writer),
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        // Closing the channel ends the writer loop once the queue is drained.
        self.tx.take();
        let Some(writer) = self.writer.take() else {
            return;
        };
        if writer.join().is_err() {
            warn!("best score writer panicked");
        }
    }
}

impl ScoreSink for FileSink {
    fn notify(&self, event: ScoreEvent) {
        // The writer thread may be gone; the game carries on regardless.
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("puyotui-test-{}-{}", std::process::id(), name))
            .join(FILENAME)
    }

    #[test]
    fn missing_file_is_zero() {
        assert_eq!(load_best(&temp_path("missing")).unwrap(), 0);
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("roundtrip");
        save_best(&path, 1234).unwrap();
        assert_eq!(load_best(&path).unwrap(), 1234);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let path = temp_path("garbage");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not a number\n").unwrap();
        assert!(matches!(load_best(&path), Err(PersistError::Parse(_))));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn file_sink_keeps_only_new_best() {
        let path = temp_path("sink");
        let sink = FileSink::spawn(path.clone(), 10);
        sink.notify(ScoreEvent::ScoreChanged(50));
        sink.notify(ScoreEvent::GameOver { score: 5, max_chain: 1 });
        sink.notify(ScoreEvent::GameOver { score: 42, max_chain: 3 });

        let deadline = Instant::now() + Duration::from_secs(5);
        while load_best(&path).unwrap_or(0) != 42 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(load_best(&path).unwrap(), 42);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn dropping_file_sink_flushes_pending_best() {
        let path = temp_path("drop");
        let sink = FileSink::spawn(path.clone(), 0);
        sink.notify(ScoreEvent::GameOver { score: 99, max_chain: 2 });
        drop(sink);
        assert_eq!(load_best(&path).unwrap(), 99);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn save_replaces_without_leaving_temp_file() {
        let path = temp_path("replace");
        save_best(&path, 7).unwrap();
        save_best(&path, 8).unwrap();
        assert_eq!(load_best(&path).unwrap(), 8);
        assert!(!path.with_extension("tmp").exists());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn null_sink_accepts_everything() {
        NullSink.notify(ScoreEvent::GameOver { score: 1, max_chain: 1 });
    }
}
