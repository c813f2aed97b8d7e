//! Line-oriented write-ahead log: append, size-based rotation, and streaming
//! replay with a retention cut-off.
//!
//! One observation per line, fields comma-separated in fixed order:
//! `timestamp,metric,value,tags`. The tags field is a semicolon-separated
//! list of `key=value` pairs. The characters comma, semicolon, equals, and
//! backslash inside metric, tag keys, and tag values are escaped by a
//! preceding backslash; the value field is a plain decimal float and is not
//! escaped.

use crate::error::StoreError;
use crate::telemetry::{store_metrics, StoreEvent, StoreEventListener};
use crate::types::{DataPoint, TagSet, Timestamp, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Counts reported by one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Well-formed records at or after the cut-off, handed to the sink.
    pub replayed: usize,
    /// Well-formed records older than the cut-off, dropped.
    pub expired: usize,
    /// Malformed lines skipped.
    pub skipped: usize,
}

/// Handles write-ahead logging: append with rotation, streaming replay, close.
#[derive(Debug)]
pub struct WriteAheadLog {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    max_bytes: u64,
    /// Logical size of the active file, tracked across buffered writes.
    active_bytes: u64,
}

impl WriteAheadLog {
    /// Opens (or creates) the active WAL file for appending, creating parent
    /// directories as needed.
    pub fn open<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(StoreError::Io)?;
        let active_bytes = file.metadata()?.len();

        Ok(WriteAheadLog {
            writer: Some(BufWriter::new(file)),
            path,
            max_bytes,
            active_bytes,
        })
    }

    /// Path of the active WAL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one observation as a single line and pushes it to the OS before
    /// returning. The record is durable once this returns `Ok`.
    ///
    /// If the active file has reached the rotation threshold, it is first
    /// renamed aside to `<stem>_<epoch-millis>.log`. Rotation is best-effort:
    /// a rename failure is reported through `events` and the append proceeds
    /// against the oversized file.
    pub fn append(
        &mut self,
        point: &DataPoint,
        events: &dyn StoreEventListener,
    ) -> Result<(), StoreError> {
        if self.active_bytes >= self.max_bytes {
            match self.rotate() {
                Ok(rotated) => events.on_event(StoreEvent::WalRotated { path: rotated }),
                Err(e) => events.on_event(StoreEvent::WalRotateFailed {
                    error: e.to_string(),
                }),
            }
        }

        let line = encode_line(point);
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StoreError::Internal("WAL file not open".to_string()))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;

        let started = Instant::now();
        writer.flush()?;
        writer.get_ref().sync_data()?;
        store_metrics::record_wal_fsync(started.elapsed());

        self.active_bytes += line.len() as u64 + 1;
        store_metrics::record_wal_bytes_written(line.len() as u64 + 1);
        Ok(())
    }

    /// Renames the active file to a timestamped sibling and starts a fresh one.
    /// On a rename failure the old file is reopened for append before the
    /// error is returned.
    fn rotate(&mut self) -> Result<PathBuf, StoreError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        self.writer = None;

        let rotated = self.rotated_path(now_millis());
        if let Err(e) = fs::rename(&self.path, &rotated) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.writer = Some(BufWriter::new(file));
            return Err(StoreError::Io(e));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                sync_dir(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        self.active_bytes = 0;
        Ok(rotated)
    }

    fn rotated_path(&self, millis: u64) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("timeseries");
        self.path.with_file_name(format!("{}_{}.log", stem, millis))
    }

    /// Streams the active WAL file line by line. Well-formed records with
    /// `timestamp >= cutoff` are handed to `sink`; malformed lines are skipped
    /// with a diagnostic event and never abort the replay. Rotated siblings
    /// are archives and are not read.
    ///
    /// Replay trusts its caller's cut-off; it applies no retention check of
    /// its own beyond the one passed in.
    pub fn replay<F>(
        &self,
        cutoff: Timestamp,
        events: &dyn StoreEventListener,
        mut sink: F,
    ) -> Result<ReplayStats, StoreError>
    where
        F: FnMut(DataPoint),
    {
        let mut stats = ReplayStats::default();
        if !self.path.exists() {
            return Ok(stats);
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            match parse_line(&line) {
                Ok(point) => {
                    if point.timestamp >= cutoff {
                        sink(point);
                        stats.replayed += 1;
                    } else {
                        stats.expired += 1;
                    }
                }
                Err(e) => {
                    stats.skipped += 1;
                    events.on_event(StoreEvent::ReplayLineSkipped {
                        line_number: idx + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }

        store_metrics::record_replay(stats.replayed as u64, stats.skipped as u64);
        Ok(stats)
    }

    /// Flushes and closes the WAL file. Further appends fail until reopened.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }
}

fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    let d = File::open(dir).map_err(StoreError::Io)?;
    d.sync_data().map_err(StoreError::Io)?;
    Ok(())
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Encodes one observation as a WAL line (without the trailing newline).
pub fn encode_line(point: &DataPoint) -> String {
    let mut line = String::new();
    line.push_str(&point.timestamp.to_string());
    line.push(',');
    push_escaped(&mut line, &point.metric);
    line.push(',');
    line.push_str(&point.value.to_string());
    line.push(',');
    let mut first = true;
    for (key, value) in &point.tags {
        if !first {
            line.push(';');
        }
        first = false;
        push_escaped(&mut line, key);
        line.push('=');
        push_escaped(&mut line, value);
    }
    line
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, ',' | ';' | '=' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Parses one WAL line into an observation.
///
/// The line splits on the first three unescaped commas; the tag segment
/// splits on unescaped semicolons and then on the first unescaped equals
/// within each pair. A pair lacking an equals is silently dropped.
pub fn parse_line(line: &str) -> Result<DataPoint, StoreError> {
    let parts = split_unescaped(line, ',', 4);
    if parts.len() < 4 {
        return Err(StoreError::InvalidLine(format!(
            "expected 4 comma-separated fields, got {}",
            parts.len()
        )));
    }

    let timestamp: Timestamp = parts[0]
        .parse()
        .map_err(|_| StoreError::InvalidLine(format!("bad timestamp {:?}", parts[0])))?;
    let metric = unescape(parts[1]);
    if metric.is_empty() {
        return Err(StoreError::InvalidLine("empty metric".to_string()));
    }
    let value: Value = parts[2]
        .parse()
        .map_err(|_| StoreError::InvalidLine(format!("bad value {:?}", parts[2])))?;

    let mut tags = TagSet::new();
    if !parts[3].is_empty() {
        for pair in split_unescaped(parts[3], ';', 0) {
            let kv = split_unescaped(pair, '=', 2);
            if kv.len() == 2 {
                tags.insert(unescape(kv[0]), unescape(kv[1]));
            }
        }
    }

    Ok(DataPoint {
        timestamp,
        metric,
        value,
        tags,
    })
}

/// Splits on unescaped occurrences of `sep`. With a non-zero `limit`, at most
/// `limit` fields are produced and the last keeps the remainder verbatim.
fn split_unescaped(s: &str, sep: char, limit: usize) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            fields.push(&s[start..i]);
            start = i + c.len_utf8();
            if limit != 0 && fields.len() == limit - 1 {
                break;
            }
        }
    }
    fields.push(&s[start..]);
    fields
}

/// Removes escape backslashes. An unknown escape decodes to the literal
/// second character; a trailing lone backslash is dropped.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}
