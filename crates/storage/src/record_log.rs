//! Append-only record log backing a disk collection
//!
//! # Format
//!
//! ```text
//! +------------------+
//! | Payload Length   | 4 bytes (u32 LE)
//! | CRC32            | 4 bytes (u32 LE, over payload)
//! | Payload          | MessagePack-encoded LogRecord
//! +------------------+
//! ... repeated
//! ```
//!
//! On open, frames are replayed until the first short, oversized or
//! checksum-failing frame. Anything after that point is a torn write and is
//! truncated away.
//!
//! Compaction rewrites the live records to a temp file and renames it over
//! the log (write-fsync-rename).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use tracing::warn;
use viewbuild_core::Document;

use crate::error::StoreResult;

/// File name of the record log inside a collection directory
pub const LOG_FILE_NAME: &str = "records.log";

/// Frame header: length + crc
const FRAME_HEADER_LEN: usize = 8;

/// Frames larger than this are treated as corruption
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// One durable state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    /// Document write (including tombstones) at a sequence number
    Doc {
        /// Sequence assigned to the write
        seq: u64,
        /// Document as written
        doc: Document,
    },
    /// Local document write; `deleted` removes it
    Local {
        /// Local document as written
        doc: Document,
    },
}

/// Append handle on a record log file
#[derive(Debug)]
pub struct RecordLog {
    path: PathBuf,
    file: File,
    appended: u64,
}

impl RecordLog {
    /// Open (or create) the log at `path` and replay its records
    pub fn open(path: &Path) -> StoreResult<(Self, Vec<LogRecord>)> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let (records, valid_len) = decode_frames(&bytes);
        if valid_len < bytes.len() {
            warn!(
                target: "viewbuild::store",
                path = %path.display(),
                valid_len,
                file_len = bytes.len(),
                "Truncating torn tail of record log"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let log = RecordLog {
            path: path.to_path_buf(),
            file,
            appended: records.len() as u64,
        };
        Ok((log, records))
    }

    /// Append records as one write and sync
    pub fn append(&mut self, records: &[LogRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for record in records {
            encode_frame(record, &mut buf)?;
        }
        self.file.write_all(&buf)?;
        self.file.sync_data()?;
        self.appended += records.len() as u64;
        Ok(())
    }

    /// Replace the whole log with `records` atomically
    pub fn rewrite(&mut self, records: &[LogRecord]) -> StoreResult<()> {
        let temp_path = self.path.with_extension("tmp");

        let mut buf = Vec::new();
        for record in records {
            encode_frame(record, &mut buf)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if parent.exists() {
                File::open(parent)?.sync_all()?;
            }
        }

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.appended = records.len() as u64;
        Ok(())
    }

    /// Records currently in the file, live or superseded
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn encode_frame(record: &LogRecord, buf: &mut Vec<u8>) -> StoreResult<()> {
    let payload = rmp_serde::to_vec_named(record)?;
    buf.write_u32::<LittleEndian>(payload.len() as u32)?;
    buf.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    buf.extend_from_slice(&payload);
    Ok(())
}

/// Decode frames until the first invalid one; returns the records and the
/// byte length of the valid prefix.
fn decode_frames(bytes: &[u8]) -> (Vec<LogRecord>, usize) {
    let mut records = Vec::new();
    let mut offset = 0;

    while bytes.len() - offset >= FRAME_HEADER_LEN {
        let mut header = &bytes[offset..offset + FRAME_HEADER_LEN];
        let (Ok(len), Ok(crc)) = (
            header.read_u32::<LittleEndian>(),
            header.read_u32::<LittleEndian>(),
        ) else {
            break;
        };
        let len = len as usize;
        let start = offset + FRAME_HEADER_LEN;
        if len > MAX_FRAME_LEN || start + len > bytes.len() {
            break;
        }
        let payload = &bytes[start..start + len];
        if crc32fast::hash(payload) != crc {
            break;
        }
        match rmp_serde::from_slice::<LogRecord>(payload) {
            Ok(record) => records.push(record),
            Err(_) => break,
        }
        offset = start + len;
    }

    (records, offset)
}
