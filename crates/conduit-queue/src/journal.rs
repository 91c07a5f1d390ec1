use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;

/// A single journaled queue transition.
///
/// On-disk format of each record:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// A message was accepted by the queue.
    Enqueued(QueueMessage),
    /// A delivery of the message was abandoned and it became ready again.
    Abandoned(Uuid),
    /// The message was settled and will never be delivered again.
    Completed(Uuid),
}

/// Flush/sync strategy for the journal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every record (safest, highest latency).
    #[default]
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    OsDefault,
}

/// Configuration for the [`Journal`].
#[derive(Clone, Debug, Default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Internal mutable state for the journal writer.
struct JournalWriter {
    writer: BufWriter<File>,
    /// Current write offset in the journal file.
    offset: u64,
}

/// Crash-recoverable, append-only queue journal.
///
/// Records are serialized with bincode, framed with a length prefix and a
/// CRC32 checksum, and appended to a single file. On replay the file is read
/// front-to-back; records that fail the CRC check are skipped and a torn
/// tail ends the replay.
///
/// An open journal holds an exclusive advisory lock on `{path}.lock` until it
/// is dropped. The lock lives on a separate file because compaction replaces
/// the journal file itself.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    config: JournalConfig,
    _lock: File,
}

impl Journal {
    /// Open (or create) a journal file at the given path.
    ///
    /// Fails with [`QueueError::Locked`] while another `Journal` has the same
    /// path open.
    pub fn open(path: &Path, config: JournalConfig) -> QueueResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock = acquire_lock(&lock_path(path))?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            config,
            _lock: lock,
        })
    }

    fn encode(record: &JournalRecord) -> QueueResult<Vec<u8>> {
        let payload =
            bincode::serialize(record).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Append a single record. Returns the byte offset of the record.
    pub fn append(&self, record: &JournalRecord) -> QueueResult<u64> {
        let frame = Self::encode(record)?;

        let mut w = self.writer.lock().expect("journal mutex poisoned");
        let record_offset = w.offset;

        w.writer.write_all(&frame)?;
        w.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_data()?;
        }

        w.offset += frame.len() as u64;

        debug!(offset = record_offset, len = frame.len(), "journal append");
        Ok(record_offset)
    }

    /// Read every valid record from the journal.
    ///
    /// Records that fail CRC validation are logged and skipped. An invalid
    /// length or a truncated payload ends the replay (torn write).
    pub fn replay(&self) -> QueueResult<Vec<JournalRecord>> {
        let mut data = Vec::new();
        BufReader::new(File::open(&self.path)?).read_to_end(&mut data)?;

        let mut records = Vec::new();
        let mut offset = 0usize;

        while offset + HEADER_SIZE <= data.len() {
            let header = &data[offset..offset + HEADER_SIZE];
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            let start = offset + HEADER_SIZE;
            if length == 0 || start + length > data.len() {
                warn!(
                    offset,
                    length,
                    file_len = data.len(),
                    "invalid journal record length; stopping replay"
                );
                break;
            }

            let payload = &data[start..start + length];
            let actual_crc = crc32fast::hash(payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping journal record"
                );
            } else {
                match bincode::deserialize::<JournalRecord>(payload) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(offset, error = %e, "undecodable journal record; skipping");
                    }
                }
            }

            offset = start + length;
        }

        debug!(recovered = records.len(), "journal replay complete");
        Ok(records)
    }

    /// Atomically replace the journal contents with `records`.
    ///
    /// Used for compaction: the new file is written next to the journal and
    /// renamed over it, so a crash leaves either the old or the new journal.
    pub fn rewrite(&self, records: &[JournalRecord]) -> QueueResult<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        let mut written = 0u64;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for record in records {
                let frame = Self::encode(record)?;
                out.write_all(&frame)?;
                written += frame.len() as u64;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;

        let mut w = self.writer.lock().expect("journal mutex poisoned");
        tmp.persist(&self.path).map_err(|e| e.error)?;
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = written;

        debug!(records = records.len(), bytes = written, "journal rewritten");
        Ok(())
    }

    /// Current write offset (journal size in bytes).
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("journal mutex poisoned").offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn acquire_lock(path: &Path) -> QueueResult<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            Err(QueueError::Locked(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("offset", &self.offset())
            .finish()
    }
}
