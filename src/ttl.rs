// Optional per-key expiration layered on top of the type-encoding layer.
// Lazy eviction on read, eager eviction on a periodic sweep, and a text
// sidecar (`ttl.data` by default) persisted next to the segment files so
// expirations survive a restart.
//
// Eviction runs against caller-supplied `exists`/`delete` callbacks
// (wired up in `db.rs` to the type-dispatching `types::exists_any`/
// `types::delete_any`) rather than a single flat engine key, so `EXPIRE`
// works uniformly across composite types with several sub-keys (a hash's
// fields, a list's items, ...), not just strings.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::options::DbOptions;

fn now_nanos() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0)
}

type ExistsFn = Box<dyn Fn(&str) -> Result<bool> + Send + Sync>;
type DeleteFn = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

pub struct TtlCoordinator {
	exists: ExistsFn,
	delete: DeleteFn,
	expire_at: RwLock<HashMap<String, i64>>,
	ttl_path: PathBuf,
	flush_on_change: bool,
	need_flush: AtomicBool,
	stop_tx: Sender<()>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl TtlCoordinator {
	/// `exists`/`delete` dispatch on the *user* key across all five types;
	/// the coordinator itself knows nothing about composite key layout.
	pub fn open(
		ttl_path: PathBuf,
		opts: &DbOptions,
		exists: impl Fn(&str) -> Result<bool> + Send + Sync + 'static,
		delete: impl Fn(&str) -> Result<()> + Send + Sync + 'static,
	) -> Result<std::sync::Arc<TtlCoordinator>> {
		let expire_at = RwLock::new(Self::load(&ttl_path)?);

		let (stop_tx, stop_rx) = channel();
		let coordinator = std::sync::Arc::new(TtlCoordinator {
			exists: Box::new(exists),
			delete: Box::new(delete),
			expire_at,
			ttl_path,
			flush_on_change: opts.flush_ttl_on_change,
			need_flush: AtomicBool::new(false),
			stop_tx,
			worker: Mutex::new(None),
		});

		let interval = opts.expire_check_interval;
		let background = coordinator.clone();
		let handle = thread::spawn(move || loop {
			match stop_rx.recv_timeout(interval) {
				Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
				Err(RecvTimeoutError::Timeout) => {
					background.sweep();
					if background.need_flush.swap(false, Ordering::SeqCst) {
						if let Err(e) = background.save() {
							log::warn!(target: "fincas", "failed to persist TTL metadata: {}", e);
						}
					}
				}
			}
		});
		*coordinator.worker.lock().unwrap() = Some(handle);

		Ok(coordinator)
	}

	fn load(path: &PathBuf) -> Result<HashMap<String, i64>> {
		let file = match File::open(path) {
			Ok(f) => f,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
			Err(e) => return Err(Error::from(e)),
		};

		let mut map = HashMap::new();
		for line in BufReader::new(file).lines() {
			let line = line?;
			let mut parts = line.splitn(2, ' ');
			let key = match parts.next() {
				Some(k) => k,
				None => continue,
			};
			let rest = match parts.next() {
				Some(r) => r,
				None => continue,
			};
			if let Ok(nanos) = rest.parse::<i64>() {
				map.insert(key.to_string(), nanos);
			}
		}
		Ok(map)
	}

	fn save(&self) -> Result<()> {
		let mut tmp_name = self.ttl_path.clone().into_os_string();
		tmp_name.push(".tmp");
		let tmp_path = PathBuf::from(tmp_name);

		{
			let mut file = File::create(&tmp_path)?;
			let map = self.expire_at.read();
			for (key, expire_at) in map.iter() {
				writeln!(file, "{} {}", key, expire_at)?;
			}
			file.sync_all()?;
		}
		fs::rename(&tmp_path, &self.ttl_path)?;
		Ok(())
	}

	fn mark_dirty(&self) -> Result<()> {
		if self.flush_on_change {
			self.save()
		} else {
			self.need_flush.store(true, Ordering::SeqCst);
			Ok(())
		}
	}

	/// Sets `key` to expire after `ttl`. The key must currently exist.
	pub fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
		if ttl.as_nanos() == 0 {
			return Err(Error::InvalidTtl);
		}
		if !(self.exists)(key)? {
			return Err(Error::KeyNotFound);
		}
		let expire_at = now_nanos().saturating_add(ttl.as_nanos() as i64);
		self.expire_at.write().insert(key.to_string(), expire_at);
		self.mark_dirty()
	}

	/// Removes any expiration set on `key`. The key must currently exist.
	pub fn persist(&self, key: &str) -> Result<()> {
		if !(self.exists)(key)? {
			return Err(Error::KeyNotFound);
		}
		self.expire_at.write().remove(key);
		self.mark_dirty()
	}

	/// Remaining time-to-live in milliseconds, or `None` if `key` carries no
	/// expiration (it may still not exist at all; callers check that
	/// separately).
	pub fn ttl_millis(&self, key: &str) -> Option<i64> {
		let expire_at = *self.expire_at.read().get(key)?;
		let remaining = (expire_at - now_nanos()).max(0);
		Some(remaining / 1_000_000)
	}

	/// Lazy path, called by readers before consulting the engine. Returns
	/// `true` and evicts `key` if it has already expired.
	pub fn check_and_evict(&self, key: &str) -> bool {
		let expired = match self.expire_at.read().get(key) {
			Some(expire_at) => now_nanos() >= *expire_at,
			None => false,
		};
		if expired {
			self.evict(key);
		}
		expired
	}

	fn evict(&self, key: &str) {
		let _ = (self.delete)(key);
		self.expire_at.write().remove(key);
		self.need_flush.store(true, Ordering::SeqCst);
	}

	/// Eager path, run by the background sweeper on each tick.
	fn sweep(&self) {
		let now = now_nanos();
		let expired: Vec<String> = {
			let map = self.expire_at.read();
			map.iter().filter(|(_, expire_at)| now >= **expire_at).map(|(k, _)| k.clone()).collect()
		};
		for key in expired {
			self.evict(&key);
		}
	}

	/// Drops any key that has expired but has not yet been swept from a
	/// key listing, matching the lazy + eager expiry contract without
	/// mutating state from a read-only enumeration.
	pub fn filter_live(&self, keys: Vec<String>) -> Vec<String> {
		let now = now_nanos();
		let map = self.expire_at.read();
		keys.into_iter()
			.filter(|k| match map.get(k) {
				Some(expire_at) => now < *expire_at,
				None => true,
			})
			.collect()
	}

	pub fn close(&self) {
		let _ = self.stop_tx.send(());
		if let Some(handle) = self.worker.lock().unwrap().take() {
			let _ = handle.join();
		}
		if let Err(e) = self.save() {
			log::warn!(target: "fincas", "failed to persist TTL metadata on close: {}", e);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::Engine;
	use crate::options::Options;
	use std::sync::Arc;
	use tempfile::tempdir;

	fn open_engine(dir: &std::path::Path) -> Arc<Engine> {
		let mut opts = Options::default();
		opts.data_dir = dir.to_path_buf();
		Arc::new(Engine::open(opts).unwrap())
	}

	fn open_ttl(engine: &Arc<Engine>, opts: &DbOptions) -> Arc<TtlCoordinator> {
		let path = engine.data_dir().join(&opts.ttl_metadata_file);
		let e1 = engine.clone();
		let e2 = engine.clone();
		TtlCoordinator::open(path, opts, move |k| e1.exists(k), move |k| e2.del(k)).unwrap()
	}

	fn fast_sweep_opts() -> DbOptions {
		DbOptions { expire_check_interval: Duration::from_secs(3600), ..DbOptions::default() }
	}

	#[test]
	fn expire_then_lazy_read_evicts() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		engine.put("k", b"v").unwrap();

		let ttl = open_ttl(&engine, &fast_sweep_opts());
		ttl.expire("k", Duration::from_nanos(1)).unwrap();
		thread::sleep(Duration::from_millis(5));

		assert!(ttl.check_and_evict("k"));
		assert!(engine.get("k").is_err());
		ttl.close();
	}

	#[test]
	fn persist_clears_expiration() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		engine.put("k", b"v").unwrap();

		let ttl = open_ttl(&engine, &fast_sweep_opts());
		ttl.expire("k", Duration::from_secs(10)).unwrap();
		ttl.persist("k").unwrap();
		assert!(ttl.ttl_millis("k").is_none());
		ttl.close();
	}

	#[test]
	fn expire_on_missing_key_fails() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		let ttl = open_ttl(&engine, &fast_sweep_opts());
		assert!(matches!(ttl.expire("missing", Duration::from_secs(1)), Err(Error::KeyNotFound)));
		ttl.close();
	}

	#[test]
	fn reopen_restores_ttl_sidecar() {
		let dir = tempdir().unwrap();
		{
			let engine = open_engine(dir.path());
			engine.put("k", b"v").unwrap();
			let ttl = open_ttl(&engine, &fast_sweep_opts());
			ttl.expire("k", Duration::from_secs(3600)).unwrap();
			ttl.close();
			engine.close().unwrap();
		}

		let engine = open_engine(dir.path());
		let ttl = open_ttl(&engine, &fast_sweep_opts());
		assert!(ttl.ttl_millis("k").is_some());
		ttl.close();
	}
}
