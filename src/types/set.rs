// Set type accessor. Members are stored as `set:<k>:<m>` with a sentinel
// `"1"` value and a `_len_` cardinality marker. `sinter` below computes a
// proper set intersection: only members present in every key's set
// survive.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::batch::BatchPool;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{keys, parse_int, scan_prefix};

fn read_len(engine: &Engine, key: &str) -> Result<i64> {
	match engine.get(&keys::set_len_key(key)) {
		Ok(v) => parse_int(&v),
		Err(Error::KeyNotFound) => Ok(0),
		Err(e) => Err(e),
	}
}

/// Adds `members` (deduplicated), returning the number newly added.
pub fn sadd(engine: &Engine, batches: &BatchPool, key: &str, members: &[String]) -> Result<i64> {
	if members.is_empty() {
		return Ok(0);
	}
	let unique: HashSet<&String> = members.iter().collect();
	let current_len = read_len(engine, key)?;

	let mut added = 0i64;
	let mut wb = batches.acquire();
	for member in unique {
		let member_key = keys::set_member_key(key, member);
		if !engine.exists(&member_key)? {
			wb.put(member_key, b"1".to_vec());
			added += 1;
		}
	}
	if added > 0 {
		wb.put(keys::set_len_key(key), (current_len + added).to_string());
	}
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(added)
}

/// Removes `members`, returning the number actually present. Deletes the
/// `_len_` marker entirely once the set empties.
pub fn srem(engine: &Engine, batches: &BatchPool, key: &str, members: &[String]) -> Result<i64> {
	if members.is_empty() {
		return Ok(0);
	}
	let current_len = read_len(engine, key)?;

	let mut removed = 0i64;
	let mut wb = batches.acquire();
	for member in members {
		let member_key = keys::set_member_key(key, member);
		if engine.exists(&member_key)? {
			wb.delete(member_key);
			removed += 1;
		}
	}
	if removed > 0 {
		let new_len = current_len - removed;
		if new_len > 0 {
			wb.put(keys::set_len_key(key), new_len.to_string());
		} else {
			wb.delete(keys::set_len_key(key));
		}
	}
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(removed)
}

pub fn sismember(engine: &Engine, key: &str, member: &str) -> Result<bool> {
	engine.exists(&keys::set_member_key(key, member))
}

pub fn smembers(engine: &Engine, key: &str) -> Result<Vec<String>> {
	let prefix = keys::set_prefix(key);
	let len_key = keys::set_len_key(key);
	Ok(scan_prefix(engine, &prefix).into_iter().filter(|k| k != &len_key).map(|k| k[prefix.len()..].to_string()).collect())
}

pub fn scard(engine: &Engine, key: &str) -> Result<i64> {
	read_len(engine, key)
}

/// Removes and returns up to `count` pseudo-random members, shuffled with
/// a per-call seeded PRNG, via `srem`.
pub fn spop(engine: &Engine, batches: &BatchPool, key: &str, count: usize) -> Result<Vec<String>> {
	if count == 0 {
		return Ok(Vec::new());
	}
	let mut members = smembers(engine, key)?;
	if members.is_empty() {
		return Ok(Vec::new());
	}
	members.shuffle(&mut thread_rng());
	let take = count.min(members.len());
	let popped: Vec<String> = members.into_iter().take(take).collect();
	srem(engine, batches, key, &popped)?;
	Ok(popped)
}

/// Returns `count` members without removing them. A positive `count`
/// returns distinct members (up to the set's size); a negative `count`
/// allows repeats, always returning `-count` members.
pub fn srandmember(engine: &Engine, key: &str, count: i64) -> Result<Vec<String>> {
	if count == 0 {
		return Ok(Vec::new());
	}
	let members = smembers(engine, key)?;
	if members.is_empty() {
		return Ok(Vec::new());
	}

	let mut rng = thread_rng();
	if count < 0 {
		let n = (-count) as usize;
		let mut out = Vec::with_capacity(n);
		for _ in 0..n {
			out.push(members[rand::Rng::gen_range(&mut rng, 0..members.len())].clone());
		}
		Ok(out)
	} else {
		let mut shuffled = members;
		shuffled.shuffle(&mut rng);
		shuffled.truncate(count as usize);
		Ok(shuffled)
	}
}

pub fn sdiff(engine: &Engine, keys_in: &[String]) -> Result<Vec<String>> {
	if keys_in.is_empty() {
		return Ok(Vec::new());
	}
	let mut result: HashSet<String> = smembers(engine, &keys_in[0])?.into_iter().collect();
	for key in &keys_in[1..] {
		for member in smembers(engine, key)? {
			result.remove(&member);
		}
	}
	Ok(result.into_iter().collect())
}

pub fn sunion(engine: &Engine, keys_in: &[String]) -> Result<Vec<String>> {
	let mut result: HashSet<String> = HashSet::new();
	for key in keys_in {
		result.extend(smembers(engine, key)?);
	}
	Ok(result.into_iter().collect())
}

/// Proper intersection: a member survives only if present in every key's
/// member set.
pub fn sinter(engine: &Engine, keys_in: &[String]) -> Result<Vec<String>> {
	if keys_in.is_empty() {
		return Ok(Vec::new());
	}
	let mut result: HashSet<String> = smembers(engine, &keys_in[0])?.into_iter().collect();
	for key in &keys_in[1..] {
		let members: HashSet<String> = smembers(engine, key)?.into_iter().collect();
		result.retain(|m| members.contains(m));
		if result.is_empty() {
			break;
		}
	}
	Ok(result.into_iter().collect())
}

/// Moves `member` from `source` to `destination`. Returns `false` without
/// effect if `member` is not in `source`.
pub fn smove(engine: &Engine, batches: &BatchPool, source: &str, destination: &str, member: &str) -> Result<bool> {
	let src_member_key = keys::set_member_key(source, member);
	if !engine.exists(&src_member_key)? {
		return Ok(false);
	}

	let src_len = read_len(engine, source)?;
	let dst_member_key = keys::set_member_key(destination, member);
	let dst_exists = engine.exists(&dst_member_key)?;

	let mut wb = batches.acquire();
	wb.delete(src_member_key);
	if src_len > 1 {
		wb.put(keys::set_len_key(source), (src_len - 1).to_string());
	} else {
		wb.delete(keys::set_len_key(source));
	}
	if !dst_exists {
		let dst_len = read_len(engine, destination)?;
		wb.put(dst_member_key, b"1".to_vec());
		wb.put(keys::set_len_key(destination), (dst_len + 1).to_string());
	}
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(true)
}

/// Deletes every member plus the `_len_` marker.
pub fn clear(engine: &Engine, key: &str) -> Result<()> {
	for composite in scan_prefix(engine, &keys::set_prefix(key)) {
		engine.del(&composite)?;
	}
	engine.del(&keys::set_len_key(key))
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

	fn strs(ss: &[&str]) -> Vec<String> {
		ss.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn sadd_dedupes_and_tracks_cardinality() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		assert_eq!(sadd(&e, &b, "s", &strs(&["a", "b", "a"])).unwrap(), 2);
		assert_eq!(scard(&e, "s").unwrap(), 2);
		assert_eq!(sadd(&e, &b, "s", &strs(&["a"])).unwrap(), 0);
	}

	#[test]
	fn srem_clears_len_key_when_empty() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		sadd(&e, &b, "s", &strs(&["a"])).unwrap();
		assert_eq!(srem(&e, &b, "s", &strs(&["a"])).unwrap(), 1);
		assert!(!e.exists(&keys::set_len_key("s")).unwrap());
	}

	#[test]
	fn set_algebra() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		sadd(&e, &b, "a", &strs(&["x", "y", "z"])).unwrap();
		sadd(&e, &b, "b", &strs(&["y", "z", "w"])).unwrap();

		let mut inter = sinter(&e, &strs(&["a", "b"])).unwrap();
		inter.sort();
		assert_eq!(inter, vec!["y".to_string(), "z".to_string()]);

		let mut union = sunion(&e, &strs(&["a", "b"])).unwrap();
		union.sort();
		assert_eq!(union, vec!["w".to_string(), "x".to_string(), "y".to_string(), "z".to_string()]);

		let diff = sdiff(&e, &strs(&["a", "b"])).unwrap();
		assert_eq!(diff, vec!["x".to_string()]);
	}

	#[test]
	fn smove_transfers_membership() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		sadd(&e, &b, "src", &strs(&["m"])).unwrap();
		assert!(smove(&e, &b, "src", "dst", "m").unwrap());
		assert!(!sismember(&e, "src", "m").unwrap());
		assert!(sismember(&e, "dst", "m").unwrap());
		assert!(!smove(&e, &b, "src", "dst", "missing").unwrap());
	}

	#[test]
	fn spop_removes_popped_members() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		sadd(&e, &b, "s", &strs(&["a", "b", "c"])).unwrap();
		let popped = spop(&e, &b, "s", 2).unwrap();
		assert_eq!(popped.len(), 2);
		assert_eq!(scard(&e, "s").unwrap(), 1);
	}
}
