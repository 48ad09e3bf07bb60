// String type accessor. Relies on the engine's own per-shard index lock
// for atomicity rather than a dedicated per-key mutex, since `incr`/
// `append`/`getset` are each a single `get` followed by a single `put`
// under the same key.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{keys, parse_int};

pub fn set(engine: &Engine, key: &str, value: &[u8]) -> Result<()> {
	engine.put(&keys::string_key(key), value)
}

pub fn get(engine: &Engine, key: &str) -> Result<Vec<u8>> {
	engine.get(&keys::string_key(key))
}

pub fn del(engine: &Engine, key: &str) -> Result<()> {
	engine.del(&keys::string_key(key))
}

fn current_int(engine: &Engine, key: &str) -> Result<i64> {
	match engine.get(&keys::string_key(key)) {
		Ok(v) => parse_int(&v),
		Err(Error::KeyNotFound) => Ok(0),
		Err(e) => Err(e),
	}
}

fn incr_by(engine: &Engine, key: &str, delta: i64) -> Result<i64> {
	let next = current_int(engine, key)?.wrapping_add(delta);
	engine.put(&keys::string_key(key), next.to_string().as_bytes())?;
	Ok(next)
}

pub fn incr(engine: &Engine, key: &str) -> Result<i64> {
	incr_by(engine, key, 1)
}

pub fn incrby(engine: &Engine, key: &str, delta: i64) -> Result<i64> {
	incr_by(engine, key, delta)
}

pub fn decr(engine: &Engine, key: &str) -> Result<i64> {
	incr_by(engine, key, -1)
}

pub fn decrby(engine: &Engine, key: &str, delta: i64) -> Result<i64> {
	incr_by(engine, key, -delta)
}

/// Appends `value` to the current string (treating an absent key as
/// empty) and returns the new length.
pub fn append(engine: &Engine, key: &str, value: &[u8]) -> Result<i64> {
	let composite = keys::string_key(key);
	let mut current = match engine.get(&composite) {
		Ok(v) => v,
		Err(Error::KeyNotFound) => Vec::new(),
		Err(e) => return Err(e),
	};
	current.extend_from_slice(value);
	let len = current.len() as i64;
	engine.put(&composite, &current)?;
	Ok(len)
}

/// Sets `key` to `value`, returning the prior value (or `None` if absent).
pub fn getset(engine: &Engine, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
	let composite = keys::string_key(key);
	let prior = match engine.get(&composite) {
		Ok(v) => Some(v),
		Err(Error::KeyNotFound) => None,
		Err(e) => return Err(e),
	};
	engine.put(&composite, value)?;
	Ok(prior)
}

/// Sets `key` to `value` only if it does not already exist; returns
/// whether the set happened.
pub fn setnx(engine: &Engine, key: &str, value: &[u8]) -> Result<bool> {
	let composite = keys::string_key(key);
	if engine.exists(&composite)? {
		return Ok(false);
	}
	engine.put(&composite, value)?;
	Ok(true)
}

pub fn mset(engine: &Engine, pairs: &[(String, Vec<u8>)]) -> Result<()> {
	for (key, value) in pairs {
		engine.put(&keys::string_key(key), value)?;
	}
	Ok(())
}

/// Looks up each key independently; an absent key yields `None` at its
/// position rather than failing the whole call.
pub fn mget(engine: &Engine, keys_in: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
	let mut out = Vec::with_capacity(keys_in.len());
	for key in keys_in {
		match engine.get(&keys::string_key(key)) {
			Ok(v) => out.push(Some(v)),
			Err(Error::KeyNotFound) => out.push(None),
			Err(e) => return Err(e),
		}
	}
	Ok(out)
}

pub fn strlen(engine: &Engine, key: &str) -> Result<i64> {
	match engine.get(&keys::string_key(key)) {
		Ok(v) => Ok(v.len() as i64),
		Err(Error::KeyNotFound) => Ok(0),
		Err(e) => Err(e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::options::Options;
	use tempfile::tempdir;

	fn open(dir: &std::path::Path) -> Engine {
		let mut opts = Options::default();
		opts.data_dir = dir.to_path_buf();
		Engine::open(opts).unwrap()
	}

	#[test]
	fn set_get_append_strlen() {
		let dir = tempdir().unwrap();
		let e = open(dir.path());
		set(&e, "foo", b"bar").unwrap();
		assert_eq!(get(&e, "foo").unwrap(), b"bar");
		assert_eq!(strlen(&e, "foo").unwrap(), 3);
		assert_eq!(append(&e, "foo", b"baz").unwrap(), 6);
		assert_eq!(get(&e, "foo").unwrap(), b"barbaz");
	}

	#[test]
	fn incr_decr_round_trip() {
		let dir = tempdir().unwrap();
		let e = open(dir.path());
		assert_eq!(incr(&e, "counter").unwrap(), 1);
		assert_eq!(incrby(&e, "counter", 10).unwrap(), 11);
		assert_eq!(decr(&e, "counter").unwrap(), 10);
		set(&e, "counter", b"notanint").unwrap();
		assert!(matches!(incr(&e, "counter"), Err(Error::NotAnInteger)));
	}

	#[test]
	fn getset_and_setnx() {
		let dir = tempdir().unwrap();
		let e = open(dir.path());
		assert_eq!(getset(&e, "k", b"a").unwrap(), None);
		assert_eq!(getset(&e, "k", b"b").unwrap(), Some(b"a".to_vec()));
		assert!(!setnx(&e, "k", b"c").unwrap());
		assert!(setnx(&e, "k2", b"c").unwrap());
	}

	#[test]
	fn mset_and_mget() {
		let dir = tempdir().unwrap();
		let e = open(dir.path());
		mset(&e, &[("a".into(), b"1".to_vec()), ("b".into(), b"2".to_vec())]).unwrap();
		let got = mget(&e, &["a".into(), "b".into(), "missing".into()]).unwrap();
		assert_eq!(got, vec![Some(b"1".to_vec()), Some(b"2".to_vec()), None]);
	}
}
