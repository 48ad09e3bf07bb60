// Bitcask-style storage engine: glue of the log file manager, record
// codec, memory index, value cache and membership filter.
// `put/get/del/list_keys/fold/merge/sync/close`, plus crash recovery on
// `open`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::ValueCache;
use crate::error::{Error, Result};
use crate::filter::BloomFilter;
use crate::index::{DirEntry, ShardedIndex};
use crate::log_manager::LogFileManager;
use crate::options::Options;
use crate::record::{self, Record, MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// Tracks a write batch's buffered-but-not-yet-applied op records while
/// `recover` walks the log looking for the matching end marker.
struct PendingBatch {
	start_file_id: u32,
	start_offset: u64,
	ops: Vec<(u32, u64, u32, Record)>,
}

pub struct Engine {
	fm: LogFileManager,
	index: ShardedIndex,
	cache: Option<ValueCache>,
	filter: BloomFilter,
	closed: AtomicBool,
	last_ts: AtomicI64,
	options: Options,
}

impl Engine {
	pub fn open(options: Options) -> Result<Engine> {
		let (fm, segment_ids) = LogFileManager::open(&options.data_dir, options.max_file_size, options.max_open_files)?;
		let index = ShardedIndex::new(options.mem_index_kind, options.mem_index_shard_count, options.btree_degree);
		let filter = BloomFilter::new(options.bloom_expected_keys, options.bloom_false_positive_rate);
		let cache = if options.open_mem_cache { Some(ValueCache::new(options.mem_cache_size)) } else { None };

		let engine = Engine {
			fm,
			index,
			cache,
			filter,
			closed: AtomicBool::new(false),
			last_ts: AtomicI64::new(0),
			options,
		};

		engine.recover(&segment_ids)?;
		Ok(engine)
	}

	fn recover(&self, segment_ids: &[u32]) -> Result<()> {
		let newest = segment_ids.iter().copied().max().unwrap_or(0);
		// Buffers a write batch's op records between its start/end markers so
		// they are applied to the index as one unit, and discarded as one
		// unit if the log ends (crash) before the end marker is found.
		let mut pending: Option<PendingBatch> = None;

		for &id in segment_ids {
			let bytes = std::fs::read(self.fm.dir().join(crate::log_manager::segment_file_name(id)))?;
			let mut offset: usize = 0;

			while offset < bytes.len() {
				match record::decode(&bytes[offset..]) {
					Ok(rec) => {
						let size = rec.encoded_len() as u32;
						if rec.is_batch_start() {
							if let Some(abandoned) = pending.take() {
								log::warn!(
									target: "fincas",
									"recover: discarding {} record(s) from a batch left unterminated by a nested start marker",
									abandoned.ops.len()
								);
							}
							pending = Some(PendingBatch { start_file_id: id, start_offset: offset as u64, ops: Vec::new() });
						} else if rec.is_batch_end() {
							if let Some(buffered) = pending.take() {
								for (bid, boff, bsize, brec) in buffered.ops {
									self.apply_recovered(bid, boff, bsize, &brec);
								}
							}
						} else if let Some(buffered) = pending.as_mut() {
							buffered.ops.push((id, offset as u64, size, rec));
						} else {
							self.apply_recovered(id, offset as u64, size, &rec);
						}
						offset += size as usize;
					}
					Err(_) if id == newest => {
						log::warn!(
							target: "fincas",
							"truncating trailing partial record in segment {} at offset {}",
							id,
							offset
						);
						self.fm.truncate(id, offset as u64)?;
						break;
					}
					Err(e) => {
						return Err(Error::Corruption(format!(
							"segment {} corrupt at offset {}: {}",
							id, offset, e
						)));
					}
				}
			}
		}

		if let Some(buffered) = pending.take() {
			log::warn!(
				target: "fincas",
				"recover: discarding {} record(s) from a batch left unterminated at end of log",
				buffered.ops.len()
			);
			if buffered.start_file_id == newest {
				self.fm.truncate(newest, buffered.start_offset)?;
			}
		}

		Ok(())
	}

	fn apply_recovered(&self, file_id: u32, offset: u64, size: u32, rec: &Record) {
		let key = String::from_utf8_lossy(&rec.key).into_owned();
		if rec.is_tombstone() {
			self.index.del(&key);
		} else {
			self.index.put(&key, DirEntry { file_id, offset, size, timestamp: rec.timestamp });
			self.filter.add(key.as_bytes());
		}
		if rec.timestamp > self.last_ts.load(Ordering::SeqCst) {
			self.last_ts.store(rec.timestamp, Ordering::SeqCst);
		}
	}

	fn next_timestamp(&self) -> i64 {
		let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0);
		loop {
			let last = self.last_ts.load(Ordering::SeqCst);
			let next = if now > last { now } else { last + 1 };
			if self.last_ts.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
				return next;
			}
		}
	}

	fn check_open(&self) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(Error::Closed);
		}
		Ok(())
	}

	pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
		self.check_open()?;
		if key.is_empty() {
			return Err(Error::EmptyKey);
		}
		if key.len() > MAX_KEY_SIZE {
			return Err(Error::KeyTooLarge(key.len()));
		}
		if value.len() > MAX_VALUE_SIZE {
			return Err(Error::ValueTooLarge(value.len()));
		}

		let ts = self.next_timestamp();
		let record = Record::put(ts, key.as_bytes().to_vec(), value.to_vec());
		let bytes = record::encode(&record)?;
		let (file_id, offset, size) = self.fm.append(&bytes)?;

		self.index.put(key, DirEntry { file_id, offset, size, timestamp: ts });
		self.filter.add(key.as_bytes());
		if let Some(cache) = &self.cache {
			cache.insert(key, value.to_vec());
		}
		Ok(())
	}

	/// Writes a record and returns its directory entry without touching the
	/// index/filter/cache — used by the write batch, which defers index
	/// visibility until the whole batch has been appended.
	pub(crate) fn append_only(&self, key: &str, value: Option<&[u8]>, timestamp: i64) -> Result<DirEntry> {
		let record = match value {
			Some(v) => Record { timestamp, flags: 0, key: key.as_bytes().to_vec(), value: v.to_vec() },
			None => Record::tombstone(timestamp, key.as_bytes().to_vec()),
		};
		let bytes = record::encode(&record)?;
		let (file_id, offset, size) = self.fm.append(&bytes)?;
		Ok(DirEntry { file_id, offset, size, timestamp })
	}

	pub(crate) fn commit_entry(&self, key: &str, entry: DirEntry, value: Option<&[u8]>) {
		self.index.put(key, entry);
		self.filter.add(key.as_bytes());
		match value {
			Some(v) => {
				if let Some(cache) = &self.cache {
					cache.insert(key, v.to_vec());
				}
			}
			None => {
				self.index.del(key);
				if let Some(cache) = &self.cache {
					cache.invalidate(key);
				}
			}
		}
	}

	pub(crate) fn issue_timestamp(&self) -> i64 {
		self.next_timestamp()
	}

	/// Appends a batch start/end marker record, used by `WriteBatch::commit`
	/// to bracket its op records so recovery can tell a fully-appended batch
	/// apart from one truncated mid-write by a crash.
	pub(crate) fn append_batch_marker(&self, is_start: bool, timestamp: i64) -> Result<()> {
		let record = if is_start { Record::batch_start(timestamp) } else { Record::batch_end(timestamp) };
		let bytes = record::encode(&record)?;
		self.fm.append(&bytes)?;
		Ok(())
	}

	pub fn get(&self, key: &str) -> Result<Vec<u8>> {
		self.check_open()?;
		if let Some(cache) = &self.cache {
			if let Some(v) = cache.get(key) {
				return Ok(v);
			}
		}
		if !self.filter.contains(key.as_bytes()) {
			return Err(Error::KeyNotFound);
		}
		let entry = self.index.get(key).ok_or(Error::KeyNotFound)?;
		let bytes = self.fm.read_at(entry.file_id, entry.offset, entry.size)?;
		let record = record::decode(&bytes)?;
		if record.is_tombstone() {
			return Err(Error::KeyNotFound);
		}
		if let Some(cache) = &self.cache {
			cache.insert(key, record.value.clone());
		}
		Ok(record.value)
	}

	pub fn exists(&self, key: &str) -> Result<bool> {
		self.check_open()?;
		if !self.filter.contains(key.as_bytes()) {
			return Ok(false);
		}
		Ok(self.index.get(key).is_some())
	}

	pub fn del(&self, key: &str) -> Result<()> {
		self.check_open()?;
		if self.index.get(key).is_none() {
			return Ok(());
		}
		let ts = self.next_timestamp();
		let record = Record::tombstone(ts, key.as_bytes().to_vec());
		let bytes = record::encode(&record)?;
		self.fm.append(&bytes)?;

		self.index.del(key);
		if let Some(cache) = &self.cache {
			cache.invalidate(key);
		}
		Ok(())
	}

	pub fn list_keys(&self) -> Result<Vec<String>> {
		self.check_open()?;
		let mut keys = Vec::with_capacity(self.index.len());
		self.index.foreach(|k, _| {
			keys.push(k.to_string());
			true
		});
		Ok(keys)
	}

	pub fn fold<F: FnMut(&str, &[u8]) -> bool>(&self, mut f: F) -> Result<()> {
		self.check_open()?;
		let mut error = None;
		let fm = &self.fm;
		self.index.foreach(|k, e| match fm.read_at(e.file_id, e.offset, e.size).and_then(|b| record::decode(&b)) {
			Ok(rec) => f(k, &rec.value),
			Err(err) => {
				error = Some(err);
				false
			}
		});
		match error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	pub fn sync(&self) -> Result<()> {
		self.check_open()?;
		self.fm.sync()
	}

	pub fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		self.fm.sync()
	}

	pub fn data_dir(&self) -> &Path {
		self.fm.dir()
	}

	pub fn filter(&self) -> &BloomFilter {
		&self.filter
	}

	pub fn index(&self) -> &ShardedIndex {
		&self.index
	}

	/// Rebuilds sealed segments whose live-byte ratio falls below
	/// `min_merge_ratio`. Live-byte accounting is computed on demand by
	/// scanning the current index rather than maintained incrementally per
	/// segment, since the index is already the single source of truth for
	/// liveness.
	pub fn merge(&self) -> Result<()> {
		self.check_open()?;

		let sealed: Vec<u32> = {
			let active = self.fm.active_id();
			self.fm.list_segments()?.into_iter().filter(|id| *id != active).collect()
		};
		if sealed.is_empty() {
			return Ok(());
		}

		let mut live_bytes: std::collections::HashMap<u32, u64> = std::collections::HashMap::new();
		self.index.foreach(|_, e| {
			*live_bytes.entry(e.file_id).or_insert(0) += e.size as u64;
			true
		});

		let mut candidates = Vec::new();
		for &id in &sealed {
			let total = self.fm.segment_len(id)?;
			if total == 0 {
				candidates.push(id);
				continue;
			}
			let live = *live_bytes.get(&id).unwrap_or(&0);
			let ratio = live as f64 / total as f64;
			if ratio < self.options.min_merge_ratio {
				candidates.push(id);
			}
		}
		if candidates.is_empty() {
			return Ok(());
		}

		log::info!(target: "fincas", "merge: compacting {} segment(s)", candidates.len());
		let candidate_set: std::collections::HashSet<u32> = candidates.iter().copied().collect();

		// Snapshot of keys whose live entry currently points at a
		// candidate segment.
		let mut to_rewrite: Vec<(String, DirEntry)> = Vec::new();
		self.index.foreach(|k, e| {
			if candidate_set.contains(&e.file_id) {
				to_rewrite.push((k.to_string(), *e));
			}
			true
		});

		self.fm.rotate()?;
		for (key, snapshot_entry) in to_rewrite {
			let bytes = match self.fm.read_at(snapshot_entry.file_id, snapshot_entry.offset, snapshot_entry.size) {
				Ok(b) => b,
				Err(_) => continue,
			};
			let rec = match record::decode(&bytes) {
				Ok(r) => r,
				Err(_) => continue,
			};
			let (file_id, offset, size) = self.fm.append(&bytes)?;
			let new_entry = DirEntry { file_id, offset, size, timestamp: rec.timestamp };

			// Swap in the merged copy only if the index still holds exactly
			// the snapshot we rewrote; a concurrent put/del landing in
			// between leaves the newer entry (or absence) untouched.
			self.index.compare_and_swap_if_not_newer(&key, snapshot_entry, new_entry);
		}

		self.fm.sync()?;

		for id in candidates {
			if let Err(e) = self.fm.delete(id) {
				log::warn!(target: "fincas", "merge: failed to delete old segment {}: {}", id, e);
			}
		}

		self.rebuild_filter();
		Ok(())
	}

	fn rebuild_filter(&self) {
		self.filter.reset();
		self.index.foreach(|k, _| {
			self.filter.add(k.as_bytes());
			true
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn open_engine(dir: &Path) -> Engine {
		let mut opts = Options::default();
		opts.data_dir = dir.to_path_buf();
		opts.max_file_size = 4096;
		Engine::open(opts).unwrap()
	}

	#[test]
	fn put_then_get_roundtrips() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		engine.put("foo", b"bar").unwrap();
		assert_eq!(engine.get("foo").unwrap(), b"bar");
	}

	#[test]
	fn del_makes_key_absent() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		engine.put("foo", b"bar").unwrap();
		engine.del("foo").unwrap();
		assert!(matches!(engine.get("foo"), Err(Error::KeyNotFound)));
	}

	#[test]
	fn del_of_missing_key_is_idempotent() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		engine.del("missing").unwrap();
	}

	#[test]
	fn reopen_preserves_live_keys() {
		let dir = tempdir().unwrap();
		{
			let engine = open_engine(dir.path());
			for i in 0..50 {
				engine.put(&format!("k{}", i), format!("v{}", i).as_bytes()).unwrap();
			}
			engine.del("k3").unwrap();
			engine.close().unwrap();
		}
		let engine = open_engine(dir.path());
		assert_eq!(engine.get("k7").unwrap(), b"v7");
		assert!(matches!(engine.get("k3"), Err(Error::KeyNotFound)));
	}

	#[test]
	fn merge_preserves_values_and_shrinks_segment_count() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		for i in 0..500 {
			engine.put(&format!("k{}", i), b"0123456789").unwrap();
		}
		for i in 0..500 {
			if i % 2 == 1 {
				engine.del(&format!("k{}", i)).unwrap();
			}
		}
		let before = engine.fm.list_segments().unwrap().len();
		engine.merge().unwrap();
		let after = engine.fm.list_segments().unwrap().len();
		assert!(after <= before);

		for i in 0..500 {
			let key = format!("k{}", i);
			if i % 2 == 0 {
				assert_eq!(engine.get(&key).unwrap(), b"0123456789");
			} else {
				assert!(matches!(engine.get(&key), Err(Error::KeyNotFound)));
			}
		}
	}

	#[test]
	fn empty_key_is_rejected() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		assert!(matches!(engine.put("", b"v"), Err(Error::EmptyKey)));
	}

	#[test]
	fn closed_engine_rejects_operations() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		engine.close().unwrap();
		assert!(matches!(engine.put("a", b"b"), Err(Error::Closed)));
	}
}
