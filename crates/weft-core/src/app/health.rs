//! Healthcheck - ループの生存確認
//!
//! Polling service は各キューを処理するたびに、現在時刻（RFC 3339）を
//! ファイルに書く。ただし `min_period` より頻繁には書かない。
//! 別プロセス（`weft healthcheck`）がその時刻を読み、古すぎれば unhealthy。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::ports::Clock;

pub struct HealthcheckWriter {
    path: PathBuf,
    min_period: Duration,
    clock: Arc<dyn Clock>,
    last_write: Option<DateTime<Utc>>,
}

impl HealthcheckWriter {
    pub fn new(path: impl Into<PathBuf>, min_period: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            min_period,
            clock,
            last_write: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current time unconditionally.
    pub async fn write(&mut self) -> std::io::Result<()> {
        let now = self.clock.now();
        tokio::fs::write(&self.path, now.to_rfc3339()).await?;
        self.last_write = Some(now);
        debug!(path = %self.path.display(), "healthcheck written");
        Ok(())
    }

    /// Write unless the last write is younger than `min_period`.
    /// Failures are logged, never returned.
    pub async fn write_if_due(&mut self) -> bool {
        if let Some(last) = self.last_write {
            let age = (self.clock.now() - last).to_std().unwrap_or_default();
            if age < self.min_period {
                return false;
            }
        }
        match self.write().await {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to write healthcheck file");
                false
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("cannot read healthcheck file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("healthcheck file {0} is empty")]
    Empty(PathBuf),

    #[error("healthcheck file {path} holds an invalid timestamp: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: chrono::ParseError,
    },

    #[error("last heartbeat at {last} is older than {max_age:?}")]
    Stale {
        last: DateTime<Utc>,
        max_age: Duration,
    },
}

/// Healthy when the file holds a timestamp no older than `unhealthy_after`.
/// Returns that timestamp.
pub async fn check_health(
    path: &Path,
    unhealthy_after: Duration,
    clock: &dyn Clock,
) -> Result<DateTime<Utc>, HealthError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| HealthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let content = content.trim();
    if content.is_empty() {
        return Err(HealthError::Empty(path.to_path_buf()));
    }

    let last = DateTime::parse_from_rfc3339(content)
        .map_err(|source| HealthError::Parse {
            path: path.to_path_buf(),
            source,
        })?
        .with_timezone(&Utc);

    let age = (clock.now() - last).to_std().unwrap_or_default();
    if age > unhealthy_after {
        return Err(HealthError::Stale {
            last,
            max_age: unhealthy_after,
        });
    }
    Ok(last)
}
