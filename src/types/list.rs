// List type accessor. `_head_`/`_tail_` are signed 64-bit indexes that
// grow outward from the first insertion; LPush/RPush/LPop/RPop/LRange/
// LTrim/LInsert/BLPop/BRPop all operate on that pointer pair through one
// write batch per call.

use std::thread;
use std::time::{Duration, Instant};

use crate::batch::BatchPool;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{keys, parse_int};

const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn read_len(engine: &Engine, key: &str) -> Result<i64> {
	match engine.get(&keys::list_len_key(key)) {
		Ok(v) => parse_int(&v),
		Err(Error::KeyNotFound) => Ok(0),
		Err(e) => Err(e),
	}
}

/// `(head, tail)`, defaulting to `(0, 0)` for a list that does not exist
/// yet (mirroring `getListPointers`'s fallback).
fn read_pointers(engine: &Engine, key: &str) -> Result<(i64, i64)> {
	let head = match engine.get(&keys::list_head_key(key)) {
		Ok(v) => parse_int(&v)?,
		Err(Error::KeyNotFound) => 0,
		Err(e) => return Err(e),
	};
	let tail = match engine.get(&keys::list_tail_key(key)) {
		Ok(v) => parse_int(&v)?,
		Err(Error::KeyNotFound) => 0,
		Err(e) => return Err(e),
	};
	Ok((head, tail))
}

/// Pushes `values` onto the head, each new element placed before the
/// current head in insertion order (so `lpush L a b c` on an empty list
/// ends up `[c, b, a]`, matching `RList.LPush`). Returns the new length.
pub fn lpush(engine: &Engine, batches: &BatchPool, key: &str, values: &[Vec<u8>]) -> Result<i64> {
	if values.is_empty() {
		return Ok(read_len(engine, key)?);
	}
	let mut length = read_len(engine, key)?;
	let (mut head, tail) = read_pointers(engine, key)?;

	let mut wb = batches.acquire();
	for value in values {
		head -= 1;
		wb.put(keys::list_item_key(key, head), value.clone());
		length += 1;
	}
	wb.put(keys::list_head_key(key), head.to_string());
	// Mirrors `RList.LPush`'s own check: the tail pointer is only
	// (re)written here if it reads back as the zero value, i.e. this is
	// the list's first-ever write.
	if tail == 0 {
		wb.put(keys::list_tail_key(key), (head + values.len() as i64 - 1).to_string());
	}
	wb.put(keys::list_len_key(key), length.to_string());
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(length)
}

/// Pushes `values` onto the tail, in order, so `rpush L a b c` on an
/// empty list ends up `[a, b, c]`.
pub fn rpush(engine: &Engine, batches: &BatchPool, key: &str, values: &[Vec<u8>]) -> Result<i64> {
	if values.is_empty() {
		return Ok(read_len(engine, key)?);
	}
	let mut length = read_len(engine, key)?;
	let (mut head, mut tail) = read_pointers(engine, key)?;
	if length == 0 {
		head = 0;
		tail = -1;
	}

	let mut wb = batches.acquire();
	for value in values {
		tail += 1;
		wb.put(keys::list_item_key(key, tail), value.clone());
		length += 1;
	}
	wb.put(keys::list_tail_key(key), tail.to_string());
	if head == 0 && length == values.len() as i64 {
		wb.put(keys::list_head_key(key), "0".to_string());
	}
	wb.put(keys::list_len_key(key), length.to_string());
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(length)
}

fn pop(engine: &Engine, batches: &BatchPool, key: &str, from_head: bool) -> Result<Vec<u8>> {
	let length = read_len(engine, key)?;
	if length == 0 {
		return Err(Error::KeyNotFound);
	}
	let (head, tail) = read_pointers(engine, key)?;
	let idx = if from_head { head } else { tail };

	let item_key = keys::list_item_key(key, idx);
	let value = engine.get(&item_key)?;

	let mut wb = batches.acquire();
	wb.delete(item_key);
	let new_length = length - 1;
	if new_length > 0 {
		if from_head {
			wb.put(keys::list_head_key(key), (head + 1).to_string());
		} else {
			wb.put(keys::list_tail_key(key), (tail - 1).to_string());
		}
	} else {
		wb.delete(keys::list_head_key(key));
		wb.delete(keys::list_tail_key(key));
	}
	wb.put(keys::list_len_key(key), new_length.to_string());
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(value)
}

pub fn lpop(engine: &Engine, batches: &BatchPool, key: &str) -> Result<Vec<u8>> {
	pop(engine, batches, key, true)
}

pub fn rpop(engine: &Engine, batches: &BatchPool, key: &str) -> Result<Vec<u8>> {
	pop(engine, batches, key, false)
}

pub fn llen(engine: &Engine, key: &str) -> Result<i64> {
	read_len(engine, key)
}

/// Resolves a possibly-negative Redis-style index/range pair against
/// `length`, clamping to `[0, length)`. Returns `None` if the resulting
/// range is empty.
fn resolve_range(start: i64, stop: i64, length: i64) -> Option<(i64, i64)> {
	let mut start = if start < 0 { length + start } else { start };
	let mut stop = if stop < 0 { length + stop } else { stop };
	if start < 0 {
		start = 0;
	}
	if stop >= length {
		stop = length - 1;
	}
	if start > stop {
		return None;
	}
	Some((start, stop))
}

pub fn lrange(engine: &Engine, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
	let length = read_len(engine, key)?;
	if length == 0 {
		return Ok(Vec::new());
	}
	let (head, _) = read_pointers(engine, key)?;
	let (start, stop) = match resolve_range(start, stop, length) {
		Some(r) => r,
		None => return Ok(Vec::new()),
	};

	let mut out = Vec::with_capacity((stop - start + 1) as usize);
	for i in start..=stop {
		out.push(engine.get(&keys::list_item_key(key, head + i))?);
	}
	Ok(out)
}

/// Trims the list to `[start, stop]`, deleting everything outside the
/// range; an empty resulting range deletes the whole list.
pub fn ltrim(engine: &Engine, batches: &BatchPool, key: &str, start: i64, stop: i64) -> Result<()> {
	let length = read_len(engine, key)?;
	if length == 0 {
		return Ok(());
	}
	let (head, tail) = read_pointers(engine, key)?;

	let mut wb = batches.acquire();
	match resolve_range(start, stop, length) {
		None => {
			for i in head..=tail {
				wb.delete(keys::list_item_key(key, i));
			}
			wb.delete(keys::list_head_key(key));
			wb.delete(keys::list_tail_key(key));
			wb.put(keys::list_len_key(key), "0".to_string());
		}
		Some((start, stop)) => {
			for i in head..head + start {
				wb.delete(keys::list_item_key(key, i));
			}
			for i in head + stop + 1..=tail {
				wb.delete(keys::list_item_key(key, i));
			}
			wb.put(keys::list_head_key(key), (head + start).to_string());
			wb.put(keys::list_tail_key(key), (head + stop).to_string());
			wb.put(keys::list_len_key(key), (stop - start + 1).to_string());
		}
	}
	let result = wb.commit();
	batches.release(wb);
	result
}

/// Linear scan from head to find a value equal to `pivot`, shifting
/// everything from the pivot (inclusive, for `before`) or past it (for
/// `after`) one slot toward the tail to open a gap. Returns the new
/// length, or `-1` with no change if `pivot` is not found.
pub fn linsert(engine: &Engine, batches: &BatchPool, key: &str, before: bool, pivot: &[u8], value: &[u8]) -> Result<i64> {
	let length = read_len(engine, key)?;
	if length == 0 {
		return Ok(-1);
	}
	let (head, tail) = read_pointers(engine, key)?;

	let mut pivot_idx = None;
	for i in head..=tail {
		if engine.get(&keys::list_item_key(key, i))? == pivot {
			pivot_idx = Some(i);
			break;
		}
	}
	let pivot_idx = match pivot_idx {
		Some(i) => i,
		None => return Ok(-1),
	};
	let insert_idx = if before { pivot_idx } else { pivot_idx + 1 };

	let mut wb = batches.acquire();
	let mut i = tail;
	while i >= insert_idx {
		let val = engine.get(&keys::list_item_key(key, i))?;
		wb.put(keys::list_item_key(key, i + 1), val);
		i -= 1;
	}
	wb.put(keys::list_item_key(key, insert_idx), value.to_vec());

	let new_tail = tail + 1;
	let new_length = length + 1;
	wb.put(keys::list_tail_key(key), new_tail.to_string());
	wb.put(keys::list_len_key(key), new_length.to_string());
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(new_length)
}

/// Polls `lpop`/`rpop` across `keys` at a fixed interval until one
/// succeeds or `timeout` elapses, returning `(key, value)`. The 10 ms
/// poll interval is an implementation detail; only the timeout and
/// first-available semantics are guaranteed.
fn blocking_pop(engine: &Engine, batches: &BatchPool, keys_in: &[String], timeout: Duration, from_head: bool) -> Result<Option<(String, Vec<u8>)>> {
	if keys_in.is_empty() {
		return Ok(None);
	}
	let deadline = Instant::now() + timeout;
	loop {
		for key in keys_in {
			match pop(engine, batches, key, from_head) {
				Ok(value) => return Ok(Some((key.clone(), value))),
				Err(Error::KeyNotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		if Instant::now() >= deadline {
			return Ok(None);
		}
		thread::sleep(BLOCKING_POLL_INTERVAL.min(deadline - Instant::now()));
	}
}

pub fn blpop(engine: &Engine, batches: &BatchPool, keys_in: &[String], timeout: Duration) -> Result<Option<(String, Vec<u8>)>> {
	blocking_pop(engine, batches, keys_in, timeout, true)
}

pub fn brpop(engine: &Engine, batches: &BatchPool, keys_in: &[String], timeout: Duration) -> Result<Option<(String, Vec<u8>)>> {
	blocking_pop(engine, batches, keys_in, timeout, false)
}

/// Deletes every item plus the `_len_`/`_head_`/`_tail_` markers. Used by
/// the TTL coordinator's generalized delete path.
pub fn clear(engine: &Engine, key: &str) -> Result<()> {
	let length = read_len(engine, key)?;
	if length > 0 {
		let (head, tail) = read_pointers(engine, key)?;
		for i in head..=tail {
			engine.del(&keys::list_item_key(key, i))?;
		}
	}
	engine.del(&keys::list_head_key(key))?;
	engine.del(&keys::list_tail_key(key))?;
	engine.del(&keys::list_len_key(key))
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

	fn vals(strs: &[&str]) -> Vec<Vec<u8>> {
		strs.iter().map(|s| s.as_bytes().to_vec()).collect()
	}

	fn range_strs(engine: &Engine, key: &str) -> Vec<String> {
		lrange(engine, key, 0, -1).unwrap().into_iter().map(|v| String::from_utf8(v).unwrap()).collect()
	}

	#[test]
	fn rpush_then_lpush_matches_literal_scenario() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		assert_eq!(rpush(&e, &b, "L", &vals(&["a", "b", "c"])).unwrap(), 3);
		assert_eq!(range_strs(&e, "L"), vec!["a", "b", "c"]);
		assert_eq!(lpush(&e, &b, "L", &vals(&["z"])).unwrap(), 4);
		assert_eq!(range_strs(&e, "L"), vec!["z", "a", "b", "c"]);
		ltrim(&e, &b, "L", 1, 2).unwrap();
		assert_eq!(range_strs(&e, "L"), vec!["a", "b"]);
	}

	#[test]
	fn pop_of_empty_list_is_not_found() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		assert!(matches!(lpop(&e, &b, "L"), Err(Error::KeyNotFound)));
	}

	#[test]
	fn pop_drains_and_clears_pointers() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		rpush(&e, &b, "L", &vals(&["a", "b"])).unwrap();
		assert_eq!(lpop(&e, &b, "L").unwrap(), b"a");
		assert_eq!(rpop(&e, &b, "L").unwrap(), b"b");
		assert_eq!(llen(&e, "L").unwrap(), 0);
		assert!(matches!(lpop(&e, &b, "L"), Err(Error::KeyNotFound)));
	}

	#[test]
	fn linsert_before_and_after() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		rpush(&e, &b, "L", &vals(&["a", "c"])).unwrap();
		linsert(&e, &b, "L", true, b"c", b"b").unwrap();
		assert_eq!(range_strs(&e, "L"), vec!["a", "b", "c"]);
		assert_eq!(linsert(&e, &b, "L", false, b"missing", b"x").unwrap(), -1);
	}

	#[test]
	fn blpop_returns_immediately_when_available() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		rpush(&e, &b, "L", &vals(&["a"])).unwrap();
		let (key, value) = blpop(&e, &b, &["L".to_string()], Duration::from_millis(50)).unwrap().unwrap();
		assert_eq!(key, "L");
		assert_eq!(value, b"a");
	}

	#[test]
	fn blpop_times_out_on_empty_keys() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		let result = blpop(&e, &b, &["missing".to_string()], Duration::from_millis(20)).unwrap();
		assert!(result.is_none());
	}
}
