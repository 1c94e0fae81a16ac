//! C8 — circular, checksummed record stream; begin/commit/abort;
//! checkpoints; rotation.

use crate::core::error::{CoreError, CoreResult};
use crc32fast::Hasher;
use std::collections::HashSet;
use std::mem::size_of;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const MIN_WAL_SIZE: u64 = 64 * 1024;
pub const MAX_WAL_SIZE: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpKind {
    Begin = 0,
    Commit = 1,
    Abort = 2,
    Checkpoint = 3,
    Insert = 4,
    Delete = 5,
    Update = 6,
    Write = 7,
}

impl OpKind {
    pub fn from_u8(v: u8) -> CoreResult<Self> {
        Ok(match v {
            0 => OpKind::Begin,
            1 => OpKind::Commit,
            2 => OpKind::Abort,
            3 => OpKind::Checkpoint,
            4 => OpKind::Insert,
            5 => OpKind::Delete,
            6 => OpKind::Update,
            7 => OpKind::Write,
            _ => return Err(CoreError::Corrupted(format!("unknown WAL op kind {v}"))),
        })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub tx_id: u64,
    pub lsn: u64,
    pub op_kind: u8,
    pub _reserved_pad: [u8; 3],
    pub data_len: u32,
    pub timestamp: u64,
    pub checksum: u32,
    pub reserved: u32,
}

const _: () = assert!(size_of::<RecordHeader>() == 40);

#[derive(Debug, Clone)]
pub struct Record {
    pub tx_id: u64,
    pub lsn: u64,
    pub op_kind: OpKind,
    pub timestamp: u64,
    pub data: Vec<u8>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn record_checksum(header: &RecordHeader, data: &[u8]) -> u32 {
    let mut zeroed = *header;
    zeroed.checksum = 0;
    let header_bytes = unsafe { crate::core::utils::serialize_row(&zeroed) };
    let mut h = Hasher::new();
    h.update(header_bytes);
    let header_crc = h.finalize();
    let mut d = Hasher::new();
    d.update(data);
    let data_crc = d.finalize();
    header_crc.wrapping_add(data_crc.rotate_left(1))
}

struct Inner {
    buf: Vec<u8>,
    capacity: usize,
    head: usize,
    tail: usize,
    entry_count: u64,
    next_tx_id: u64,
    next_lsn: u64,
    checkpoint_lsn: u64,
    active: HashSet<u64>,
    auto_checkpoint: bool,
    checkpoint_entries_threshold: u64,
    checkpoint_interval: Duration,
    last_checkpoint: Instant,
}

impl Inner {
    fn free_space(&self) -> usize {
        if self.tail == self.head {
            if self.entry_count == 0 {
                self.capacity
            } else {
                0
            }
        } else if self.tail > self.head {
            self.capacity - (self.tail - self.head)
        } else {
            self.head - self.tail
        }
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> CoreResult<()> {
        if bytes.len() > self.free_space() {
            return Err(CoreError::NoLogSpace);
        }
        let until_end = self.capacity - self.tail;
        if bytes.len() <= until_end {
            self.buf[self.tail..self.tail + bytes.len()].copy_from_slice(bytes);
            self.tail = (self.tail + bytes.len()) % self.capacity;
        } else {
            self.buf[self.tail..self.capacity].copy_from_slice(&bytes[..until_end]);
            self.buf[0..bytes.len() - until_end].copy_from_slice(&bytes[until_end..]);
            self.tail = bytes.len() - until_end;
        }
        Ok(())
    }

    fn append_record(&mut self, tx_id: u64, op_kind: OpKind, data: &[u8]) -> CoreResult<u64> {
        let lsn = self.next_lsn;
        let mut header = RecordHeader {
            tx_id,
            lsn,
            op_kind: op_kind as u8,
            _reserved_pad: [0; 3],
            data_len: data.len() as u32,
            timestamp: now_secs(),
            checksum: 0,
            reserved: 0,
        };
        header.checksum = record_checksum(&header, data);
        let header_bytes = unsafe { crate::core::utils::serialize_row(&header) }.to_vec();

        let total_len = header_bytes.len() + data.len();
        if total_len > self.free_space() {
            return Err(CoreError::NoLogSpace);
        }
        self.append_bytes(&header_bytes)?;
        self.append_bytes(data)?;
        self.next_lsn += 1;
        self.entry_count += 1;
        Ok(lsn)
    }

    fn should_auto_checkpoint(&self) -> bool {
        self.auto_checkpoint
            && (self.free_space() * 4 < self.capacity
                || self.entry_count >= self.checkpoint_entries_threshold
                || self.last_checkpoint.elapsed() >= self.checkpoint_interval)
    }

    fn checkpoint(&mut self) -> CoreResult<()> {
        let lsn = self.append_record(0, OpKind::Checkpoint, &[])?;
        self.checkpoint_lsn = lsn;
        self.head = self.tail;
        self.entry_count = 0;
        self.last_checkpoint = Instant::now();
        Ok(())
    }
}

/// Circular, checksummed log with an optional background auto-checkpoint
/// thread. No async runtime (spec.md §9): the background worker is a plain
/// `std::thread`, woken on a condvar or timeout, mirroring the teacher's
/// own concurrency idiom (plain threads, no executor).
pub struct Wal {
    inner: Mutex<Inner>,
    wake: Condvar,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Wal {
    pub fn new(
        size: u64,
        auto_checkpoint: bool,
        checkpoint_entries_threshold: u64,
        checkpoint_interval: Duration,
    ) -> CoreResult<Self> {
        let size = size.clamp(MIN_WAL_SIZE, MAX_WAL_SIZE) as usize;
        let inner = Inner {
            buf: vec![0u8; size],
            capacity: size,
            head: 0,
            tail: 0,
            entry_count: 0,
            next_tx_id: 1,
            next_lsn: 0,
            checkpoint_lsn: 0,
            active: HashSet::new(),
            auto_checkpoint,
            checkpoint_entries_threshold,
            checkpoint_interval,
            last_checkpoint: Instant::now(),
        };
        Ok(Self {
            inner: Mutex::new(inner),
            wake: Condvar::new(),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    pub fn begin_tx(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let tx = inner.next_tx_id;
        inner.next_tx_id += 1;
        inner.active.insert(tx);
        let _ = inner.append_record(tx, OpKind::Begin, &[]);
        tx
    }

    fn log(&self, tx: u64, op: OpKind, data: &[u8]) -> CoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.active.contains(&tx) {
            return Err(CoreError::BadName(format!("tx {tx} is not active")));
        }
        match inner.append_record(tx, op, data) {
            Ok(lsn) => {
                if inner.should_auto_checkpoint() {
                    inner.checkpoint()?;
                }
                Ok(lsn)
            }
            Err(CoreError::NoLogSpace) if inner.auto_checkpoint => {
                inner.checkpoint()?;
                inner.append_record(tx, op, data)
            }
            Err(e) => Err(e),
        }
    }

    pub fn log_insert(&self, tx: u64, data: &[u8]) -> CoreResult<u64> {
        self.log(tx, OpKind::Insert, data)
    }

    pub fn log_delete(&self, tx: u64, data: &[u8]) -> CoreResult<u64> {
        self.log(tx, OpKind::Delete, data)
    }

    pub fn log_update(&self, tx: u64, data: &[u8]) -> CoreResult<u64> {
        self.log(tx, OpKind::Update, data)
    }

    pub fn log_write(&self, tx: u64, data: &[u8]) -> CoreResult<u64> {
        self.log(tx, OpKind::Write, data)
    }

    pub fn commit_tx(&self, tx: u64) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.active.remove(&tx) {
            return Err(CoreError::BadName(format!("tx {tx} is not active")));
        }
        inner.append_record(tx, OpKind::Commit, &[])?;
        self.wake.notify_all();
        Ok(())
    }

    pub fn abort_tx(&self, tx: u64) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.active.remove(&tx) {
            return Err(CoreError::BadName(format!("tx {tx} is not active")));
        }
        inner.append_record(tx, OpKind::Abort, &[])?;
        Ok(())
    }

    pub fn checkpoint(&self) -> CoreResult<()> {
        self.inner.lock().unwrap().checkpoint()
    }

    /// Forces the underlying mapping to stable storage. In this in-memory
    /// ring the durability boundary is the WAL's own mutex; the mmap-backed
    /// persistent layout calls `storage::Backing::flush_range` over the
    /// WAL section after copying these bytes out (see `core::layout`).
    pub fn flush(&self) -> CoreResult<()> {
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.lock().unwrap().entry_count
    }

    pub fn checkpoint_lsn(&self) -> u64 {
        self.inner.lock().unwrap().checkpoint_lsn
    }

    /// Snapshot of the ring contents plus its read cursors, in the order
    /// `core::recovery::analyze` expects to walk them.
    pub fn snapshot(&self) -> (Vec<u8>, usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.buf.clone(), inner.head, inner.tail)
    }

    /// Full state needed to reconstruct an equivalent `Wal` after a
    /// restart — ring bytes, cursors, and the monotonic counters that must
    /// not reset across a mount boundary (spec.md §4.9).
    pub fn snapshot_full(&self) -> WalSnapshot {
        let inner = self.inner.lock().unwrap();
        WalSnapshot {
            buf: inner.buf.clone(),
            head: inner.head,
            tail: inner.tail,
            next_tx_id: inner.next_tx_id,
            next_lsn: inner.next_lsn,
            checkpoint_lsn: inner.checkpoint_lsn,
            entry_count: inner.entry_count,
        }
    }

    /// Reconstructs a `Wal` from a previously persisted snapshot. Any
    /// transaction the snapshot's log still shows as BEGIN-without-COMMIT
    /// is, by construction, not `active` here: recovery (run by the caller
    /// right after this) undoes it from the log's own contents, and no
    /// live caller in the new process holds that transaction id to append
    /// more records against it.
    pub fn from_snapshot(
        snap: WalSnapshot,
        auto_checkpoint: bool,
        checkpoint_entries_threshold: u64,
        checkpoint_interval: Duration,
    ) -> CoreResult<Self> {
        let capacity = snap.buf.len();
        if !(MIN_WAL_SIZE as usize..=MAX_WAL_SIZE as usize).contains(&capacity) {
            return Err(CoreError::Corrupted("persisted WAL size out of bounds".into()));
        }
        let inner = Inner {
            buf: snap.buf,
            capacity,
            head: snap.head,
            tail: snap.tail,
            entry_count: snap.entry_count,
            next_tx_id: snap.next_tx_id,
            next_lsn: snap.next_lsn,
            checkpoint_lsn: snap.checkpoint_lsn,
            active: HashSet::new(),
            auto_checkpoint,
            checkpoint_entries_threshold,
            checkpoint_interval,
            last_checkpoint: Instant::now(),
        };
        Ok(Self {
            inner: Mutex::new(inner),
            wake: Condvar::new(),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    /// Starts the optional background auto-checkpoint worker. Stopping
    /// joins the thread (spec.md §4.7: "stopping joins the thread").
    pub fn start_auto_checkpoint(self: &Arc<Self>) -> JoinHandle<()> {
        let wal = Arc::clone(self);
        let stop = Arc::clone(&wal.stop);
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let should = {
                    let inner = wal.inner.lock().unwrap();
                    inner.should_auto_checkpoint()
                };
                if should {
                    let _ = wal.checkpoint();
                }
                std::thread::sleep(Duration::from_millis(200));
            }
        })
    }

    pub fn stop_auto_checkpoint(&self, handle: JoinHandle<()>) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = handle.join();
    }
}

/// Everything needed to reconstruct a `Wal` after a restart; see
/// `Wal::snapshot_full`/`Wal::from_snapshot`.
pub struct WalSnapshot {
    pub buf: Vec<u8>,
    pub head: usize,
    pub tail: usize,
    pub next_tx_id: u64,
    pub next_lsn: u64,
    pub checkpoint_lsn: u64,
    pub entry_count: u64,
}

pub fn verify_record_checksum(header: &RecordHeader, data: &[u8]) -> bool {
    record_checksum(header, data) == header.checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_log_commit_round_trip() {
        let wal = Wal::new(MIN_WAL_SIZE, false, 1_000_000, Duration::from_secs(3600)).unwrap();
        let tx = wal.begin_tx();
        wal.log_insert(tx, b"payload").unwrap();
        wal.commit_tx(tx).unwrap();
        assert!(wal.entry_count() >= 3);
    }

    #[test]
    fn logging_on_inactive_tx_fails() {
        let wal = Wal::new(MIN_WAL_SIZE, false, 1_000_000, Duration::from_secs(3600)).unwrap();
        assert!(wal.log_insert(999, b"x").is_err());
    }

    #[test]
    fn snapshot_restore_round_trips_uncommitted_record() {
        let wal = Wal::new(MIN_WAL_SIZE, false, 1_000_000, Duration::from_secs(3600)).unwrap();
        let tx = wal.begin_tx();
        wal.log_insert(tx, b"payload").unwrap();
        let snap = wal.snapshot_full();
        let restored = Wal::from_snapshot(snap, false, 1_000_000, Duration::from_secs(3600)).unwrap();
        let (buf, head, tail) = restored.snapshot();
        let records = crate::core::recovery::parse_records(&buf, head, tail);
        assert_eq!(records.len(), 2); // BEGIN, INSERT (no COMMIT)
    }

    #[test]
    fn checkpoint_resets_entry_count() {
        let wal = Wal::new(MIN_WAL_SIZE, false, 1_000_000, Duration::from_secs(3600)).unwrap();
        let tx = wal.begin_tx();
        wal.commit_tx(tx).unwrap();
        wal.checkpoint().unwrap();
        assert_eq!(wal.entry_count(), 0);
    }

    /// spec.md §8: "A WAL exactly full triggers either auto-checkpoint (if
    /// enabled) followed by success, or `NoLogSpace`."
    #[test]
    fn full_log_without_auto_checkpoint_reports_no_log_space() {
        let wal = Wal::new(MIN_WAL_SIZE, false, 1_000_000, Duration::from_secs(3600)).unwrap();
        let payload = vec![0u8; MIN_WAL_SIZE as usize];
        let tx = wal.begin_tx();
        assert_eq!(wal.log_insert(tx, &payload), Err(CoreError::NoLogSpace));
    }

    #[test]
    fn full_log_with_auto_checkpoint_reclaims_space_and_succeeds() {
        let wal = Wal::new(MIN_WAL_SIZE, true, 1_000_000, Duration::from_secs(3600)).unwrap();
        // Commit a transaction that nearly fills the ring, then leave it
        // unreclaimed (no explicit checkpoint): the next append has nowhere
        // to go until `log()`'s auto-checkpoint retry advances the tail.
        let tx = wal.begin_tx();
        let filler = vec![0u8; MIN_WAL_SIZE as usize - 256];
        wal.log_insert(tx, &filler).unwrap();
        wal.commit_tx(tx).unwrap();

        let tx2 = wal.begin_tx();
        let payload = vec![0u8; (MIN_WAL_SIZE as usize) / 2];
        wal.log_insert(tx2, &payload).unwrap();
        wal.commit_tx(tx2).unwrap();
    }
}
