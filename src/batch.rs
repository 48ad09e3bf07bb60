// Buffers put/delete/expire operations and commits them as one
// atomically-visible unit against the engine's index (and, for expiries,
// the TTL coordinator). `release` returns the batch to an internal pool so
// repeated type-layer operations don't allocate a fresh `Vec` per call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::Engine;
use crate::error::Result;
use crate::index::DirEntry;
use crate::ttl::TtlCoordinator;

enum Op {
	Put { key: String, value: Vec<u8> },
	Delete { key: String },
	Expire { key: String, ttl: Duration },
}

pub struct WriteBatch {
	engine: Arc<Engine>,
	ttl: Option<Arc<TtlCoordinator>>,
	ops: Vec<Op>,
	committed: bool,
}

impl WriteBatch {
	fn new(engine: Arc<Engine>, ttl: Option<Arc<TtlCoordinator>>) -> WriteBatch {
		WriteBatch { engine, ttl, ops: Vec::new(), committed: false }
	}

	pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
		self.ops.push(Op::Put { key: key.into(), value: value.into() });
	}

	pub fn delete(&mut self, key: impl Into<String>) {
		self.ops.push(Op::Delete { key: key.into() });
	}

	/// Stages an expiry alongside this batch's puts/deletes so both become
	/// visible in the same `commit()`. Only usable on a batch handed out by
	/// a pool that has had `BatchPool::attach_ttl` called on it; panics
	/// otherwise, which would be a caller bug, not a runtime condition.
	pub fn expire(&mut self, key: impl Into<String>, ttl: Duration) {
		self.ops.push(Op::Expire { key: key.into(), ttl });
	}

	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}

	pub fn is_committed(&self) -> bool {
		self.committed
	}

	/// Appends every buffered put/delete to the log bracketed by a
	/// start/end marker record, then makes all of them visible in the
	/// index/filter/cache together, followed by any staged expiries.
	/// Appending happens per-operation (the log has no native multi-record
	/// transaction), but visibility is atomic with respect to readers: a
	/// reader never observes half of a committed batch, since nothing in
	/// the batch touches the index until every record has been durably
	/// appended.
	///
	/// If an append fails partway through (disk full, I/O error), the `?`
	/// aborts here with no end marker ever written. The ops already on disk
	/// stay unindexed — live readers never see them, and on restart
	/// `Engine::recover` discards the same unterminated run (truncating it
	/// off the newest segment) since it never finds the matching end
	/// marker before the log runs out.
	///
	/// Does not consume `self` — callers release the batch back to its pool
	/// afterward.
	pub fn commit(&mut self) -> Result<()> {
		self.committed = true;
		if self.ops.is_empty() {
			return Ok(());
		}

		let needs_marker = self.ops.iter().any(|op| !matches!(op, Op::Expire { .. }));
		if needs_marker {
			let start_ts = self.engine.issue_timestamp();
			self.engine.append_batch_marker(true, start_ts)?;
		}

		let mut staged: Vec<(String, DirEntry, Option<Vec<u8>>)> = Vec::with_capacity(self.ops.len());
		let mut staged_expires: Vec<(String, Duration)> = Vec::new();
		for op in &self.ops {
			match op {
				Op::Put { key, value } => {
					let ts = self.engine.issue_timestamp();
					let entry = self.engine.append_only(key, Some(value), ts)?;
					staged.push((key.clone(), entry, Some(value.clone())));
				}
				Op::Delete { key } => {
					let ts = self.engine.issue_timestamp();
					let entry = self.engine.append_only(key, None, ts)?;
					staged.push((key.clone(), entry, None));
				}
				Op::Expire { key, ttl } => {
					staged_expires.push((key.clone(), *ttl));
				}
			}
		}

		if needs_marker {
			let end_ts = self.engine.issue_timestamp();
			self.engine.append_batch_marker(false, end_ts)?;
		}

		for (key, entry, value) in staged {
			self.engine.commit_entry(&key, entry, value.as_deref());
		}
		for (key, ttl) in staged_expires {
			let coordinator = self.ttl.as_ref().expect("WriteBatch::expire used on a batch with no TTL coordinator attached");
			coordinator.expire(&key, ttl)?;
		}
		self.ops.clear();
		Ok(())
	}
}

/// A small pool of reusable `WriteBatch` buffers.
pub struct BatchPool {
	engine: Arc<Engine>,
	ttl: Mutex<Option<Arc<TtlCoordinator>>>,
	free: Mutex<Vec<WriteBatch>>,
}

impl BatchPool {
	pub fn new(engine: Arc<Engine>) -> BatchPool {
		BatchPool { engine, ttl: Mutex::new(None), free: Mutex::new(Vec::new()) }
	}

	/// Wires a TTL coordinator into batches this pool hands out, enabling
	/// `WriteBatch::expire`. Pools used purely for a single composite
	/// type's internal multi-key puts (hash/list/set/zset accessors) have
	/// no need to call this.
	pub fn attach_ttl(&self, ttl: Arc<TtlCoordinator>) {
		*self.ttl.lock().unwrap() = Some(ttl);
	}

	pub fn acquire(&self) -> WriteBatch {
		let ttl = self.ttl.lock().unwrap().clone();
		let mut free = self.free.lock().unwrap();
		match free.pop() {
			Some(mut wb) => {
				wb.ops.clear();
				wb.committed = false;
				wb.ttl = ttl;
				wb
			}
			None => WriteBatch::new(self.engine.clone(), ttl),
		}
	}

	/// Returns an uncommitted (or already-committed) batch's buffer to the
	/// pool for reuse. Safe to call unconditionally after `commit`.
	pub fn release(&self, wb: WriteBatch) {
		let mut free = self.free.lock().unwrap();
		if free.len() < 64 {
			free.push(wb);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::options::{DbOptions, Options};
	use crate::types;
	use tempfile::tempdir;

	fn open_engine(dir: &std::path::Path) -> Arc<Engine> {
		let mut opts = Options::default();
		opts.data_dir = dir.to_path_buf();
		Arc::new(Engine::open(opts).unwrap())
	}

	fn open_ttl(engine: &Arc<Engine>) -> Arc<TtlCoordinator> {
		let opts = DbOptions { expire_check_interval: Duration::from_secs(3600), ..DbOptions::default() };
		let path = engine.data_dir().join(&opts.ttl_metadata_file);
		let e1 = engine.clone();
		let e2 = engine.clone();
		TtlCoordinator::open(path, &opts, move |k| types::exists_any(&e1, k), move |k| types::delete_any(&e2, k)).unwrap()
	}

	#[test]
	fn commit_applies_every_buffered_op() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		let pool = BatchPool::new(engine.clone());

		let mut wb = pool.acquire();
		wb.put("a", b"1".to_vec());
		wb.put("b", b"2".to_vec());
		wb.commit().unwrap();

		assert_eq!(engine.get("a").unwrap(), b"1");
		assert_eq!(engine.get("b").unwrap(), b"2");
	}

	#[test]
	fn commit_applies_deletes() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		engine.put("a", b"1").unwrap();
		let pool = BatchPool::new(engine.clone());

		let mut wb = pool.acquire();
		wb.delete("a");
		wb.commit().unwrap();

		assert!(engine.get("a").is_err());
	}

	#[test]
	fn released_batch_is_reused() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		let pool = BatchPool::new(engine.clone());

		let mut wb = pool.acquire();
		wb.put("a", b"1".to_vec());
		wb.commit().unwrap();
		pool.release(wb);

		let wb2 = pool.acquire();
		assert!(wb2.is_empty());
	}

	#[test]
	fn commit_applies_put_and_expire_together() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		let ttl = open_ttl(&engine);
		let pool = BatchPool::new(engine.clone());
		pool.attach_ttl(ttl.clone());

		let mut wb = pool.acquire();
		wb.put("a", b"1".to_vec());
		wb.expire("a", Duration::from_secs(60));
		wb.commit().unwrap();

		assert_eq!(engine.get("a").unwrap(), b"1");
		assert!(ttl.ttl_millis("a").unwrap() > 0);
		ttl.close();
	}

	#[test]
	fn expire_only_batch_writes_no_marker() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		engine.put("a", b"1").unwrap();
		let ttl = open_ttl(&engine);
		let pool = BatchPool::new(engine.clone());
		pool.attach_ttl(ttl.clone());

		let active_len_before = engine.data_dir().join("data-0.flog").metadata().map(|m| m.len()).unwrap_or(0);
		let mut wb = pool.acquire();
		wb.expire("a", Duration::from_secs(60));
		wb.commit().unwrap();
		let active_len_after = engine.data_dir().join("data-0.flog").metadata().unwrap().len();

		assert_eq!(active_len_before, active_len_after);
		assert!(ttl.ttl_millis("a").unwrap() > 0);
		ttl.close();
	}
}
