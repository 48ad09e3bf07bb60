// Log File Manager (C1): append-only segment files, rotation, fsync policy,
// and an LRU pool of open read-only descriptors for sealed segments.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;

use crate::error::{Error, Result};

pub const FILE_PREFIX: &str = "data-";
pub const FILE_SUFFIX: &str = ".flog";
const LOCK_FILE_NAME: &str = "LOCK";

pub fn segment_file_name(id: u32) -> String {
	format!("{}{}{}", FILE_PREFIX, id, FILE_SUFFIX)
}

/// Parses a segment id out of a `data-<id>.flog` file name.
pub fn parse_segment_id(name: &str) -> Option<u32> {
	let name = name.strip_prefix(FILE_PREFIX)?;
	let name = name.strip_suffix(FILE_SUFFIX)?;
	name.parse().ok()
}

struct ActiveSegment {
	id: u32,
	file: Mutex<File>,
	offset: AtomicU64,
}

/// A handle into a sealed, read-only segment. Descriptors are refcounted via
/// `Arc` so a read in flight keeps the file open even if it is evicted from
/// the LRU pool concurrently.
struct SealedHandle {
	file: Arc<Mutex<File>>,
}

struct OpenFilePool {
	max_open: usize,
	// Front = most recently used.
	order: std::collections::VecDeque<u32>,
	handles: HashMap<u32, SealedHandle>,
}

impl OpenFilePool {
	fn new(max_open: usize) -> OpenFilePool {
		OpenFilePool { max_open, order: Default::default(), handles: Default::default() }
	}

	fn touch(&mut self, id: u32) {
		if let Some(pos) = self.order.iter().position(|x| *x == id) {
			self.order.remove(pos);
		}
		self.order.push_front(id);
	}

	fn evict_if_needed(&mut self) {
		while self.handles.len() > self.max_open {
			if let Some(victim) = self.order.pop_back() {
				self.handles.remove(&victim);
			} else {
				break;
			}
		}
	}
}

pub struct LogFileManager {
	dir: PathBuf,
	max_file_size: u64,
	active: Mutex<ActiveSegment>,
	next_id: AtomicU32,
	sealed: Mutex<OpenFilePool>,
	// Held for the manager's lifetime; an OS advisory lock on `LOCK_FILE_NAME`
	// that keeps a second process from opening the same `data_dir`
	// concurrently and corrupting the log. Released automatically on drop.
	_lock: File,
}

impl LogFileManager {
	/// Opens (or creates) the log directory, discovering existing segments.
	/// Returns the manager plus the ordered list of segment ids found on
	/// disk (including the active one), for the engine's recovery pass.
	pub fn open(dir: &Path, max_file_size: u64, max_open_files: usize) -> Result<(LogFileManager, Vec<u32>)> {
		fs::create_dir_all(dir)?;

		let lock_file = OpenOptions::new().create(true).read(true).write(true).open(dir.join(LOCK_FILE_NAME))?;
		lock_file.try_lock_exclusive().map_err(|_| {
			Error::Corruption(format!("data directory {} is already locked by another instance", dir.display()))
		})?;

		let mut ids = Vec::new();
		for entry in fs::read_dir(dir)? {
			let entry = entry?;
			let name = entry.file_name();
			if let Some(name) = name.to_str() {
				if let Some(id) = parse_segment_id(name) {
					ids.push(id);
				}
			}
		}
		ids.sort_unstable();

		let active_id = ids.last().copied().unwrap_or(0);
		let path = dir.join(segment_file_name(active_id));
		let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
		let len = file.metadata()?.len();

		if ids.is_empty() {
			ids.push(active_id);
		}

		let manager = LogFileManager {
			dir: dir.to_path_buf(),
			max_file_size,
			active: Mutex::new(ActiveSegment { id: active_id, file: Mutex::new(file), offset: AtomicU64::new(len) }),
			next_id: AtomicU32::new(active_id + 1),
			sealed: Mutex::new(OpenFilePool::new(max_open_files)),
			_lock: lock_file,
		};

		Ok((manager, ids))
	}

	pub fn active_id(&self) -> u32 {
		self.active.lock().id
	}

	pub fn active_len(&self) -> u64 {
		self.active.lock().offset.load(Ordering::SeqCst)
	}

	/// Appends a record, rotating to a fresh segment first if the write
	/// would exceed `max_file_size`. Returns `(file_id, offset, size)`.
	pub fn append(&self, bytes: &[u8]) -> Result<(u32, u64, u32)> {
		let mut active = self.active.lock();
		let mut file = active.file.lock();

		let cur_len = active.offset.load(Ordering::SeqCst);
		if cur_len > 0 && cur_len + bytes.len() as u64 > self.max_file_size {
			drop(file);
			self.rotate_locked(&mut active)?;
			file = active.file.lock();
		}

		let offset = active.offset.load(Ordering::SeqCst);
		file.write_all(bytes).map_err(|e| Error::Write(e.to_string()))?;

		active.offset.fetch_add(bytes.len() as u64, Ordering::SeqCst);
		let id = active.id;
		Ok((id, offset, bytes.len() as u32))
	}

	fn rotate_locked(&self, active: &mut ActiveSegment) -> Result<()> {
		let new_id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let path = self.dir.join(segment_file_name(new_id));
		let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
		*active = ActiveSegment { id: new_id, file: Mutex::new(file), offset: AtomicU64::new(0) };
		log::info!(target: "fincas", "rotated active segment to {}", new_id);
		Ok(())
	}

	pub fn rotate(&self) -> Result<u32> {
		let mut active = self.active.lock();
		self.rotate_locked(&mut active)?;
		Ok(active.id)
	}

	/// Reads `size` bytes at `offset` from `file_id`, which may be the
	/// active segment or a sealed one.
	pub fn read_at(&self, file_id: u32, offset: u64, size: u32) -> Result<Vec<u8>> {
		{
			let active = self.active.lock();
			if active.id == file_id {
				let mut file = active.file.lock();
				let mut buf = vec![0u8; size as usize];
				file.seek(SeekFrom::Start(offset))?;
				file.read_exact(&mut buf)?;
				return Ok(buf);
			}
		}

		let handle = self.open_for_read(file_id)?;
		let mut file = handle.lock();
		let mut buf = vec![0u8; size as usize];
		file.seek(SeekFrom::Start(offset))?;
		file.read_exact(&mut buf)?;
		Ok(buf)
	}

	/// Returns a refcounted file handle for a sealed segment, opening and
	/// caching it if necessary, evicting the LRU victim if the pool is full.
	pub fn open_for_read(&self, file_id: u32) -> Result<Arc<Mutex<File>>> {
		let mut pool = self.sealed.lock();
		if let Some(h) = pool.handles.get(&file_id) {
			let f = h.file.clone();
			pool.touch(file_id);
			return Ok(f);
		}

		let path = self.dir.join(segment_file_name(file_id));
		let file = OpenOptions::new().read(true).open(&path).map_err(|_| Error::FileNotFound(path.display().to_string()))?;
		let handle = SealedHandle { file: Arc::new(Mutex::new(file)) };
		let f = handle.file.clone();
		pool.handles.insert(file_id, handle);
		pool.touch(file_id);
		pool.evict_if_needed();
		Ok(f)
	}

	pub fn sync(&self) -> Result<()> {
		let active = self.active.lock();
		active.file.lock().sync_data().map_err(|e| Error::Write(e.to_string()))?;
		Ok(())
	}

	pub fn list_segments(&self) -> Result<Vec<u32>> {
		let mut ids = Vec::new();
		for entry in fs::read_dir(&self.dir)? {
			let entry = entry?;
			if let Some(name) = entry.file_name().to_str() {
				if let Some(id) = parse_segment_id(name) {
					ids.push(id);
				}
			}
		}
		ids.sort_unstable();
		Ok(ids)
	}

	pub fn segment_len(&self, file_id: u32) -> Result<u64> {
		if self.active.lock().id == file_id {
			return Ok(self.active_len());
		}
		let path = self.dir.join(segment_file_name(file_id));
		Ok(fs::metadata(path)?.len())
	}

	/// Truncates a segment to `len` bytes, used during crash recovery to
	/// drop a trailing partial record.
	pub fn truncate(&self, file_id: u32, len: u64) -> Result<()> {
		let active = self.active.lock();
		if active.id == file_id {
			let file = active.file.lock();
			file.set_len(len)?;
			active.offset.store(len, Ordering::SeqCst);
			return Ok(());
		}
		let path = self.dir.join(segment_file_name(file_id));
		let file = OpenOptions::new().write(true).open(path)?;
		file.set_len(len)?;
		Ok(())
	}

	pub fn delete(&self, file_id: u32) -> Result<()> {
		{
			let mut pool = self.sealed.lock();
			pool.handles.remove(&file_id);
			if let Some(pos) = pool.order.iter().position(|x| *x == file_id) {
				pool.order.remove(pos);
			}
		}
		let path = self.dir.join(segment_file_name(file_id));
		fs::remove_file(path)?;
		Ok(())
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn append_and_read_roundtrip() {
		let dir = tempdir().unwrap();
		let (mgr, ids) = LogFileManager::open(dir.path(), 1 << 20, 4).unwrap();
		assert_eq!(ids, vec![0]);

		let (fid, off, size) = mgr.append(b"hello world").unwrap();
		let bytes = mgr.read_at(fid, off, size).unwrap();
		assert_eq!(bytes, b"hello world");
	}

	#[test]
	fn rotates_when_full() {
		let dir = tempdir().unwrap();
		let (mgr, _) = LogFileManager::open(dir.path(), 10, 4).unwrap();
		let first_id = mgr.active_id();
		mgr.append(b"0123456789").unwrap();
		mgr.append(b"more").unwrap();
		assert_ne!(mgr.active_id(), first_id);
	}

	#[test]
	fn evicts_lru_sealed_handle() {
		let dir = tempdir().unwrap();
		let (mgr, _) = LogFileManager::open(dir.path(), 5, 1).unwrap();
		mgr.append(b"12345").unwrap();
		mgr.rotate().unwrap();
		mgr.append(b"12345").unwrap();
		mgr.rotate().unwrap();

		mgr.open_for_read(0).unwrap();
		mgr.open_for_read(1).unwrap();
		let pool = mgr.sealed.lock();
		assert!(pool.handles.len() <= 1);
	}
}
