//! Spool-directory channel.
//!
//! Each target has a newline-delimited JSON file `<spool_dir>/<target_id>.jsonl`
//! that an upstream forwarder appends records to. The channel remembers how far
//! it has read per target, across sessions.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, warn};

use super::{Channel, ChannelError};
use crate::config::MAX_BATCH_SIZE;
use crate::domain::{RawRecord, Target};

const SPOOL_EXTENSION: &str = "jsonl";

/// A session on one target's spool file.
#[derive(Debug)]
pub struct SpoolSession {
    target_id: String,
    reader: BufReader<File>,
    offset: u64,
}

impl SpoolSession {
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Channel reading records from per-target spool files.
#[derive(Debug)]
pub struct SpoolChannel {
    spool_dir: PathBuf,
    positions: DashMap<String, u64>,
}

impl SpoolChannel {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            positions: DashMap::new(),
        }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    /// Committed read position for a target.
    pub fn position(&self, target_id: &str) -> u64 {
        self.positions.get(target_id).map(|p| *p).unwrap_or(0)
    }

    fn spool_path(&self, target_id: &str) -> PathBuf {
        self.spool_dir
            .join(format!("{}.{}", target_id, SPOOL_EXTENSION))
    }

    async fn read_batch(
        &self,
        session: &mut SpoolSession,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, ChannelError> {
        session
            .reader
            .seek(SeekFrom::Start(session.offset))
            .await
            .map_err(|e| ChannelError::remote(format!("seek failed: {}", e)))?;

        let mut records = Vec::with_capacity(max_count.min(MAX_BATCH_SIZE));
        let mut line = Vec::new();

        while records.len() < max_count {
            line.clear();
            let read = session
                .reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| ChannelError::remote(format!("read failed: {}", e)))?;

            // EOF, or a line the forwarder has not finished writing yet.
            if read == 0 || line.last() != Some(&b'\n') {
                break;
            }

            let start = session.offset;
            session.offset += read as u64;

            let parsed = match std::str::from_utf8(&line) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => serde_json::from_str::<RawRecord>(text.trim()).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match parsed {
                Ok(record) => records.push(record),
                Err(_) if !records.is_empty() => {
                    // Hand out what was read; the bad line is reported on the next fetch.
                    session.offset = start;
                    break;
                }
                Err(e) => {
                    // Skip the bad line so the spool does not wedge on it.
                    self.positions
                        .insert(session.target_id.clone(), session.offset);
                    return Err(ChannelError::remote(format!(
                        "malformed record at offset {}: {}",
                        start, e
                    )));
                }
            }
        }

        self.positions
            .insert(session.target_id.clone(), session.offset);
        Ok(records)
    }
}

#[async_trait]
impl Channel for SpoolChannel {
    type Session = SpoolSession;

    async fn connect(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<SpoolSession, ChannelError> {
        let path = self.spool_path(&target.id);
        let file = tokio::time::timeout(timeout, File::open(&path))
            .await
            .map_err(|_| ChannelError::Timeout(timeout))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ChannelError::ConnectionRefused(format!("{} not found", path.display()))
                }
                _ => ChannelError::remote(format!("{}: {}", path.display(), e)),
            })?;

        let len = file
            .metadata()
            .await
            .map(|m| m.len())
            .map_err(|e| ChannelError::remote(e.to_string()))?;

        let mut offset = self.position(&target.id);
        if offset > len {
            warn!(target_id = %target.id, offset, len, "Spool file shrank, restarting from the beginning");
            offset = 0;
            self.positions.insert(target.id.clone(), 0);
        }

        debug!(target_id = %target.id, offset, query = %target.query.query, "Opened spool session");

        Ok(SpoolSession {
            target_id: target.id.clone(),
            reader: BufReader::new(file),
            offset,
        })
    }

    async fn fetch_batch(
        &self,
        session: &mut SpoolSession,
        timeout: Duration,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, ChannelError> {
        tokio::time::timeout(timeout, self.read_batch(session, max_count))
            .await
            .map_err(|_| ChannelError::Timeout(timeout))?
    }
}
