// Hash type accessor: fields are independent composite keys with a
// `_len_` aux key tracking cardinality. Every mutation that touches both
// a field and `_len_` goes through a write batch so the pair becomes
// visible atomically.

use crate::batch::BatchPool;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{keys, parse_float, parse_int, scan_prefix};

fn read_len(engine: &Engine, key: &str) -> Result<i64> {
	match engine.get(&keys::hash_len_key(key)) {
		Ok(v) => parse_int(&v),
		Err(Error::KeyNotFound) => Ok(0),
		Err(e) => Err(e),
	}
}

/// Sets a single field, returning whether the field was newly created.
pub fn hset(engine: &Engine, batches: &BatchPool, key: &str, field: &str, value: &[u8]) -> Result<bool> {
	let field_key = keys::hash_field_key(key, field);
	let created = !engine.exists(&field_key)?;

	let mut wb = batches.acquire();
	wb.put(field_key, value.to_vec());
	if created {
		let len = read_len(engine, key)?;
		wb.put(keys::hash_len_key(key), (len + 1).to_string());
	}
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(created)
}

/// Sets every field in `fields`, within one batch; cardinality is
/// incremented once for the whole call by the number of genuinely new
/// fields, not the number of fields touched.
pub fn hmset(engine: &Engine, batches: &BatchPool, key: &str, fields: &[(String, Vec<u8>)]) -> Result<()> {
	if fields.is_empty() {
		return Ok(());
	}
	let mut new_fields = 0i64;
	let mut wb = batches.acquire();
	for (field, value) in fields {
		let field_key = keys::hash_field_key(key, field);
		if !engine.exists(&field_key)? {
			new_fields += 1;
		}
		wb.put(field_key, value.clone());
	}
	if new_fields > 0 {
		let len = read_len(engine, key)?;
		wb.put(keys::hash_len_key(key), (len + new_fields).to_string());
	}
	let result = wb.commit();
	batches.release(wb);
	result
}

pub fn hget(engine: &Engine, key: &str, field: &str) -> Result<Vec<u8>> {
	engine.get(&keys::hash_field_key(key, field))
}

pub fn hmget(engine: &Engine, key: &str, fields: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
	let mut out = Vec::with_capacity(fields.len());
	for field in fields {
		match engine.get(&keys::hash_field_key(key, field)) {
			Ok(v) => out.push(Some(v)),
			Err(Error::KeyNotFound) => out.push(None),
			Err(e) => return Err(e),
		}
	}
	Ok(out)
}

/// Deletes the given fields, decrementing `_len_` per field actually
/// present, and removing `_len_` entirely once the hash empties. Returns
/// the number of fields removed.
pub fn hdel(engine: &Engine, batches: &BatchPool, key: &str, fields: &[String]) -> Result<i64> {
	if fields.is_empty() {
		return Ok(0);
	}
	let mut removed = 0i64;
	let mut wb = batches.acquire();
	for field in fields {
		let field_key = keys::hash_field_key(key, field);
		if engine.exists(&field_key)? {
			wb.delete(field_key);
			removed += 1;
		}
	}
	if removed > 0 {
		let len = read_len(engine, key)?;
		let new_len = len - removed;
		if new_len > 0 {
			wb.put(keys::hash_len_key(key), new_len.to_string());
		} else {
			wb.delete(keys::hash_len_key(key));
		}
	}
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(removed)
}

pub fn hexists(engine: &Engine, key: &str, field: &str) -> Result<bool> {
	engine.exists(&keys::hash_field_key(key, field))
}

fn field_names(engine: &Engine, key: &str) -> Vec<String> {
	let prefix = keys::hash_prefix(key);
	let len_key = keys::hash_len_key(key);
	scan_prefix(engine, &prefix)
		.into_iter()
		.filter(|k| k != &len_key)
		.map(|k| k[prefix.len()..].to_string())
		.collect()
}

pub fn hkeys(engine: &Engine, key: &str) -> Result<Vec<String>> {
	Ok(field_names(engine, key))
}

pub fn hvals(engine: &Engine, key: &str) -> Result<Vec<Vec<u8>>> {
	let mut out = Vec::new();
	for field in field_names(engine, key) {
		out.push(engine.get(&keys::hash_field_key(key, &field))?);
	}
	Ok(out)
}

pub fn hgetall(engine: &Engine, key: &str) -> Result<Vec<(String, Vec<u8>)>> {
	let mut out = Vec::new();
	for field in field_names(engine, key) {
		let value = engine.get(&keys::hash_field_key(key, &field))?;
		out.push((field, value));
	}
	Ok(out)
}

pub fn hlen(engine: &Engine, key: &str) -> Result<i64> {
	read_len(engine, key)
}

/// Creates the field with `delta` if absent, otherwise adds `delta` to
/// the current integer value. Fails with `not-an-integer` if the field
/// holds a non-integer string.
pub fn hincrby(engine: &Engine, batches: &BatchPool, key: &str, field: &str, delta: i64) -> Result<i64> {
	let field_key = keys::hash_field_key(key, field);
	let current = match engine.get(&field_key) {
		Ok(v) => parse_int(&v)?,
		Err(Error::KeyNotFound) => 0,
		Err(e) => return Err(e),
	};
	let next = current.wrapping_add(delta);
	hset(engine, batches, key, field, next.to_string().as_bytes())?;
	Ok(next)
}

pub fn hincrbyfloat(engine: &Engine, batches: &BatchPool, key: &str, field: &str, delta: f64) -> Result<f64> {
	let field_key = keys::hash_field_key(key, field);
	let current = match engine.get(&field_key) {
		Ok(v) => parse_float(&v)?,
		Err(Error::KeyNotFound) => 0.0,
		Err(e) => return Err(e),
	};
	let next = current + delta;
	hset(engine, batches, key, field, next.to_string().as_bytes())?;
	Ok(next)
}

/// Sets `field` only if absent; returns whether the set happened.
pub fn hsetnx(engine: &Engine, batches: &BatchPool, key: &str, field: &str, value: &[u8]) -> Result<bool> {
	if engine.exists(&keys::hash_field_key(key, field))? {
		return Ok(false);
	}
	hset(engine, batches, key, field, value)?;
	Ok(true)
}

pub fn hstrlen(engine: &Engine, key: &str, field: &str) -> Result<i64> {
	match engine.get(&keys::hash_field_key(key, field)) {
		Ok(v) => Ok(v.len() as i64),
		Err(Error::KeyNotFound) => Ok(0),
		Err(e) => Err(e),
	}
}

/// Deletes every field plus the `_len_` marker. Used by the TTL
/// coordinator's generalized delete path (see `types::delete_any`).
pub fn clear(engine: &Engine, key: &str) -> Result<()> {
	for composite in scan_prefix(engine, &keys::hash_prefix(key)) {
		engine.del(&composite)?;
	}
	engine.del(&keys::hash_len_key(key))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::options::Options;
	use std::sync::Arc;
	use tempfile::tempdir;

	fn open(dir: &std::path::Path) -> (Arc<Engine>, BatchPool) {
		let mut opts = Options::default();
		opts.data_dir = dir.to_path_buf();
		let engine = Arc::new(Engine::open(opts).unwrap());
		let pool = BatchPool::new(engine.clone());
		(engine, pool)
	}

	#[test]
	fn hset_tracks_cardinality_only_for_new_fields() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		assert!(hset(&e, &b, "h", "f1", b"v1").unwrap());
		assert!(hset(&e, &b, "h", "f2", b"v2").unwrap());
		assert_eq!(hlen(&e, "h").unwrap(), 2);
		assert!(!hset(&e, &b, "h", "f1", b"v1-updated").unwrap());
		assert_eq!(hlen(&e, "h").unwrap(), 2);
		assert_eq!(hget(&e, "h", "f1").unwrap(), b"v1-updated");
	}

	#[test]
	fn hdel_removes_len_key_when_empty() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		hset(&e, &b, "h", "f1", b"v1").unwrap();
		assert_eq!(hdel(&e, &b, "h", &["f1".to_string()]).unwrap(), 1);
		assert_eq!(hlen(&e, "h").unwrap(), 0);
		assert!(!e.exists(&keys::hash_len_key("h")).unwrap());
	}

	#[test]
	fn hgetall_reflects_deletes() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		hset(&e, &b, "h", "f1", b"v1").unwrap();
		hset(&e, &b, "h", "f2", b"v2").unwrap();
		hdel(&e, &b, "h", &["f1".to_string()]).unwrap();
		let all = hgetall(&e, "h").unwrap();
		assert_eq!(all, vec![("f2".to_string(), b"v2".to_vec())]);
	}

	#[test]
	fn hincrby_creates_then_accumulates() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		assert_eq!(hincrby(&e, &b, "h", "n", 5).unwrap(), 5);
		assert_eq!(hincrby(&e, &b, "h", "n", -2).unwrap(), 3);
	}

	#[test]
	fn hsetnx_only_sets_when_absent() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		assert!(hsetnx(&e, &b, "h", "f", b"a").unwrap());
		assert!(!hsetnx(&e, &b, "h", "f", b"b").unwrap());
		assert_eq!(hget(&e, "h", "f").unwrap(), b"a");
	}
}
