/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! File-backed [`LogStore`].
//!
//! Each key is stored as `<dir>/<key>.log`, one record per line:
//!
//! ```text
//! <crc32 as 8 lowercase hex digits> <record>\n
//! ```
//!
//! Reads memory-map the file and verify every checksum, so a torn or
//! tampered record surfaces as [`TransportError::Corrupt`] instead of being
//! replayed.

use super::{LogStore, TransportError};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Durable keyed lists stored as checksummed line files.
///
/// # Examples
///
/// ```no_run
/// use exch_relay::transport::{FileLogStore, LogStore};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FileLogStore::open("/var/lib/exch")?.with_sync(true);
/// store.append("CMD", "C:mkt1,ord1,7,3")?;
/// let records = store.read_range("CMD", 0, None)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileLogStore {
    dir: PathBuf,
    sync: bool,
    files: Mutex<HashMap<String, File>>,
}

impl FileLogStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, TransportError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| TransportError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        debug!(dir = %dir.display(), "opened file log store");
        Ok(Self {
            dir,
            sync: false,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Calls `sync_data` after every append when `sync` is set.
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Returns the file backing `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRecord`] if `key` is not a plain name.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, TransportError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && key != "."
            && key != "..";
        if !valid {
            return Err(TransportError::InvalidRecord(format!(
                "log key {key:?} is not a plain file name"
            )));
        }
        Ok(self.dir.join(format!("{key}.log")))
    }
}

fn io_error(key: &str) -> impl FnOnce(io::Error) -> TransportError + '_ {
    move |source| TransportError::Io {
        key: key.to_string(),
        source,
    }
}

fn encode_line(record: &str) -> String {
    format!("{:08x} {record}\n", crc32fast::hash(record.as_bytes()))
}

fn decode_line(key: &str, position: usize, line: &[u8]) -> Result<String, TransportError> {
    let corrupt = |reason: &str| TransportError::Corrupt {
        key: key.to_string(),
        position,
        reason: reason.to_string(),
    };
    let text = std::str::from_utf8(line).map_err(|_| corrupt("not valid utf-8"))?;
    let (checksum, record) = text
        .split_once(' ')
        .ok_or_else(|| corrupt("missing checksum separator"))?;
    let expected =
        u32::from_str_radix(checksum, 16).map_err(|_| corrupt("checksum is not hexadecimal"))?;
    if crc32fast::hash(record.as_bytes()) != expected {
        return Err(corrupt("checksum mismatch"));
    }
    Ok(record.to_string())
}

impl LogStore for FileLogStore {
    fn append(&self, key: &str, record: &str) -> Result<(), TransportError> {
        if record.contains(['\n', '\r']) {
            return Err(TransportError::InvalidRecord(
                "records must not contain line breaks".to_string(),
            ));
        }
        let path = self.path_for(key)?;
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match files.entry(key.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => entry.insert(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(io_error(key))?,
            ),
        };
        file.write_all(encode_line(record).as_bytes())
            .map_err(io_error(key))?;
        if self.sync {
            file.sync_data().map_err(io_error(key))?;
        }
        Ok(())
    }

    fn read_range(
        &self,
        key: &str,
        start: usize,
        stop: Option<usize>,
    ) -> Result<Vec<String>, TransportError> {
        let path = self.path_for(key)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(key)(e)),
        };
        if file.metadata().map_err(io_error(key))?.len() == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: requires that nothing truncates or rewrites the file while
        // it is mapped. This store only appends, and the map lives for this
        // call alone; an external rewrite between calls is caught by the
        // checksums, one during the call is not.
        let map = unsafe { Mmap::map(&file) }.map_err(io_error(key))?;

        let Some(body) = map.strip_suffix(b"\n") else {
            let position = map.iter().filter(|b| **b == b'\n').count();
            return Err(TransportError::Corrupt {
                key: key.to_string(),
                position,
                reason: "torn final record".to_string(),
            });
        };

        let mut records = Vec::new();
        for (position, line) in body.split(|b| *b == b'\n').enumerate() {
            if position < start {
                continue;
            }
            if stop.is_some_and(|s| position > s) {
                break;
            }
            records.push(decode_line(key, position, line)?);
        }
        Ok(records)
    }
}
