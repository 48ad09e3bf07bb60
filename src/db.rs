// Glue layer binding the engine, TTL coordinator, and write-batch pool
// into the single handle the `server` crate's dispatcher holds. Bundles
// an `Arc<Engine>`, an expiry map, and a background merge thread behind
// one struct; the per-type command surface lives in
// `types::{string,hash,list,set,zset}` instead, operating on the
// `Arc<Engine>`/`BatchPool` this struct hands out.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::batch::BatchPool;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::options::{DbOptions, Options};
use crate::ttl::TtlCoordinator;
use crate::types::{self, KeyKind};

pub struct Database {
	engine: Arc<Engine>,
	ttl: Arc<TtlCoordinator>,
	batches: BatchPool,
	closed: AtomicBool,
	merge_stop: Sender<()>,
	merge_worker: Mutex<Option<JoinHandle<()>>>,
}

impl Database {
	pub fn open(options: Options, db_options: DbOptions) -> Result<Arc<Database>> {
		let engine = Arc::new(Engine::open(options.clone())?);
		let batches = BatchPool::new(engine.clone());

		let ttl_path = engine.data_dir().join(&db_options.ttl_metadata_file);
		let exists_engine = engine.clone();
		let delete_engine = engine.clone();
		let ttl = TtlCoordinator::open(
			ttl_path,
			&db_options,
			move |key| types::exists_any(&exists_engine, key),
			move |key| types::delete_any(&delete_engine, key),
		)?;
		batches.attach_ttl(ttl.clone());

		let (merge_stop, merge_rx) = channel();
		let merge_worker = if options.auto_merge {
			let merge_engine = engine.clone();
			let interval = options.merge_interval;
			Some(thread::spawn(move || loop {
				match merge_rx.recv_timeout(interval) {
					Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
					Err(RecvTimeoutError::Timeout) => {
						if let Err(e) = merge_engine.merge() {
							log::warn!(target: "fincas", "background merge failed: {}", e);
						}
					}
				}
			}))
		} else {
			None
		};

		Ok(Arc::new(Database { engine, ttl, batches, closed: AtomicBool::new(false), merge_stop, merge_worker: Mutex::new(merge_worker) }))
	}

	fn check_open(&self) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(Error::Closed);
		}
		Ok(())
	}

	pub fn engine(&self) -> &Arc<Engine> {
		&self.engine
	}

	pub fn batches(&self) -> &BatchPool {
		&self.batches
	}

	pub fn ttl(&self) -> &Arc<TtlCoordinator> {
		&self.ttl
	}

	/// Evicts `user_key` if its TTL has lazily expired, then reports whether
	/// it is still live. Every read-path command routes through this before
	/// touching a type accessor, so expired keys never surface through
	/// get/exists/type/keys.
	pub fn check_live(&self, user_key: &str) -> Result<bool> {
		self.check_open()?;
		if self.ttl.check_and_evict(user_key) {
			return Ok(false);
		}
		types::exists_any(&self.engine, user_key)
	}

	pub fn expire(&self, user_key: &str, ttl: Duration) -> Result<()> {
		self.check_open()?;
		self.ttl.expire(user_key, ttl)
	}

	pub fn persist(&self, user_key: &str) -> Result<()> {
		self.check_open()?;
		self.ttl.persist(user_key)
	}

	pub fn ttl_millis(&self, user_key: &str) -> Result<Option<i64>> {
		self.check_open()?;
		if !self.check_live(user_key)? {
			return Ok(None);
		}
		Ok(self.ttl.ttl_millis(user_key))
	}

	pub fn exists(&self, user_key: &str) -> Result<bool> {
		self.check_live(user_key)
	}

	pub fn type_of(&self, user_key: &str) -> Result<Option<KeyKind>> {
		self.check_open()?;
		if !self.check_live(user_key)? {
			return Ok(None);
		}
		types::type_of(&self.engine, user_key)
	}

	/// All user keys currently live, with TTL eviction applied lazily to
	/// each candidate.
	pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
		self.check_open()?;
		let candidates: Vec<String> = types::all_user_keys(&self.engine).into_iter().map(|(k, _)| k).collect();
		let live = self.ttl.filter_live(candidates);
		Ok(live.into_iter().filter(|k| types::glob_match(pattern, k)).collect())
	}

	pub fn data_dir(&self) -> &Path {
		self.engine.data_dir()
	}

	pub fn merge(&self) -> Result<()> {
		self.check_open()?;
		self.engine.merge()
	}

	pub fn sync(&self) -> Result<()> {
		self.check_open()?;
		self.engine.sync()
	}

	pub fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		let _ = self.merge_stop.send(());
		if let Some(handle) = self.merge_worker.lock().unwrap().take() {
			let _ = handle.join();
		}
		self.ttl.close();
		self.engine.close()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::string;
	use tempfile::tempdir;

	fn open(dir: &Path) -> Arc<Database> {
		let mut opts = Options::default();
		opts.data_dir = dir.to_path_buf();
		opts.auto_merge = false;
		Database::open(opts, DbOptions::default()).unwrap()
	}

	#[test]
	fn expire_then_check_live_evicts() {
		let dir = tempdir().unwrap();
		let db = open(dir.path());
		string::set(db.engine(), "k", b"v").unwrap();
		db.expire("k", Duration::from_nanos(1)).unwrap();
		thread::sleep(Duration::from_millis(5));
		assert!(!db.check_live("k").unwrap());
		assert!(matches!(string::get(db.engine(), "k"), Err(Error::KeyNotFound)));
	}

	#[test]
	fn type_of_reports_matching_kind() {
		let dir = tempdir().unwrap();
		let db = open(dir.path());
		string::set(db.engine(), "s", b"v").unwrap();
		assert_eq!(db.type_of("s").unwrap(), Some(KeyKind::String));
		assert_eq!(db.type_of("missing").unwrap(), None);
	}

	#[test]
	fn keys_respects_glob_and_ttl() {
		let dir = tempdir().unwrap();
		let db = open(dir.path());
		string::set(db.engine(), "user:1", b"a").unwrap();
		string::set(db.engine(), "user:2", b"b").unwrap();
		string::set(db.engine(), "other", b"c").unwrap();
		db.expire("user:2", Duration::from_nanos(1)).unwrap();
		thread::sleep(Duration::from_millis(5));

		let mut matched = db.keys("user:*").unwrap();
		matched.sort();
		assert_eq!(matched, vec!["user:1".to_string()]);
	}
}
