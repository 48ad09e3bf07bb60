// Sorted set accessor. Each member is indexed twice: a score lookup at
// `zset:<k>:<m>` (plain decimal score text, for O(1) ZSCORE) and a sort
// entry at `zset:<k>:s:<hex>:<m>` whose hex segment is
// `encode_score_hex` of the score, so a lexicographic prefix scan over
// `zset:<k>:s:` already yields members in ascending score order. This
// collapses the usual direct-lookup-plus-ordered-index pair onto the
// engine's own composite keyspace instead of a separate in-process
// structure.

use crate::batch::BatchPool;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{keys, parse_float, scan_prefix};

fn read_score(engine: &Engine, key: &str, member: &str) -> Result<Option<f64>> {
	match engine.get(&keys::zset_score_key(key, member)) {
		Ok(v) => Ok(Some(parse_float(&v)?)),
		Err(Error::KeyNotFound) => Ok(None),
		Err(e) => Err(e),
	}
}

/// Adds or updates `member` with `score`, returning whether it was newly
/// added (not previously present). Updating a member's score rewrites its
/// sort-index entry, since the sort key embeds the score.
pub fn zadd(engine: &Engine, batches: &BatchPool, key: &str, member: &str, score: f64) -> Result<bool> {
	keys::validate_zset_member(member)?;
	let prior = read_score(engine, key, member)?;

	let mut wb = batches.acquire();
	if let Some(old_score) = prior {
		wb.delete(keys::zset_sort_key(key, old_score, member));
	}
	wb.put(keys::zset_score_key(key, member), score.to_string());
	wb.put(keys::zset_sort_key(key, score, member), b"1".to_vec());
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(prior.is_none())
}

/// Adds `delta` to `member`'s current score (defaulting to 0 if absent)
/// and returns the new score.
pub fn zincrby(engine: &Engine, batches: &BatchPool, key: &str, member: &str, delta: f64) -> Result<f64> {
	keys::validate_zset_member(member)?;
	let next = read_score(engine, key, member)?.unwrap_or(0.0) + delta;
	zadd(engine, batches, key, member, next)?;
	Ok(next)
}

/// Members (member, score) in ascending score order, over the sort-index
/// prefix scan; ties broken by member string since the sort key appends
/// the member after the hex score.
fn ordered_pairs(engine: &Engine, key: &str) -> Vec<(String, f64)> {
	let prefix = keys::zset_sort_prefix(key);
	let mut entries: Vec<String> = scan_prefix(engine, &prefix);
	entries.sort();
	entries
		.into_iter()
		.filter_map(|k| {
			let suffix = &k[prefix.len()..];
			let (hex, member) = keys::split_sort_suffix(suffix)?;
			let score = keys::decode_score_hex(hex)?;
			Some((member.to_string(), score))
		})
		.collect()
}

fn resolve_range(len: i64, start: i64, stop: i64) -> (i64, i64) {
	let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
	let start = norm(start).min(len);
	let stop = norm(stop).min(len - 1);
	(start, stop)
}

pub fn zcard(engine: &Engine, key: &str) -> Result<i64> {
	Ok(ordered_pairs(engine, key).len() as i64)
}

/// Ascending-order members within `[start, stop]`, with Redis-style
/// negative-index wraparound.
pub fn zrange(engine: &Engine, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
	let pairs = ordered_pairs(engine, key);
	let (s, e) = resolve_range(pairs.len() as i64, start, stop);
	if s > e {
		return Ok(Vec::new());
	}
	Ok(pairs[s as usize..=e as usize].iter().map(|(m, _)| m.clone()).collect())
}

pub fn zrange_withscores(engine: &Engine, key: &str, start: i64, stop: i64) -> Result<Vec<(String, f64)>> {
	let pairs = ordered_pairs(engine, key);
	let (s, e) = resolve_range(pairs.len() as i64, start, stop);
	if s > e {
		return Ok(Vec::new());
	}
	Ok(pairs[s as usize..=e as usize].to_vec())
}

pub fn zrevrange(engine: &Engine, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
	let mut pairs = ordered_pairs(engine, key);
	pairs.reverse();
	let (s, e) = resolve_range(pairs.len() as i64, start, stop);
	if s > e {
		return Ok(Vec::new());
	}
	Ok(pairs[s as usize..=e as usize].iter().map(|(m, _)| m.clone()).collect())
}

pub fn zrevrange_withscores(engine: &Engine, key: &str, start: i64, stop: i64) -> Result<Vec<(String, f64)>> {
	let mut pairs = ordered_pairs(engine, key);
	pairs.reverse();
	let (s, e) = resolve_range(pairs.len() as i64, start, stop);
	if s > e {
		return Ok(Vec::new());
	}
	Ok(pairs[s as usize..=e as usize].to_vec())
}

/// Zero-based ascending rank, or `None` if the member is absent.
pub fn zrank(engine: &Engine, key: &str, member: &str) -> Result<Option<i64>> {
	let pairs = ordered_pairs(engine, key);
	Ok(pairs.iter().position(|(m, _)| m == member).map(|i| i as i64))
}

pub fn zrevrank(engine: &Engine, key: &str, member: &str) -> Result<Option<i64>> {
	let pairs = ordered_pairs(engine, key);
	let len = pairs.len();
	Ok(pairs.iter().position(|(m, _)| m == member).map(|i| (len - 1 - i) as i64))
}

/// Removes each of `members` independently, returning the count actually
/// present. Each member is evaluated as its own lookup key rather than
/// joined into one.
pub fn zrem(engine: &Engine, batches: &BatchPool, key: &str, members: &[String]) -> Result<i64> {
	if members.is_empty() {
		return Ok(0);
	}
	let mut removed = 0i64;
	let mut wb = batches.acquire();
	for member in members {
		if let Some(score) = read_score(engine, key, member)? {
			wb.delete(keys::zset_score_key(key, member));
			wb.delete(keys::zset_sort_key(key, score, member));
			removed += 1;
		}
	}
	let result = wb.commit();
	batches.release(wb);
	result?;
	Ok(removed)
}

pub fn zscore(engine: &Engine, key: &str, member: &str) -> Result<Option<f64>> {
	read_score(engine, key, member)
}

pub fn zcount(engine: &Engine, key: &str, min: f64, max: f64) -> Result<i64> {
	Ok(ordered_pairs(engine, key).into_iter().filter(|(_, s)| *s >= min && *s <= max).count() as i64)
}

pub fn zrangebyscore(engine: &Engine, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
	Ok(ordered_pairs(engine, key).into_iter().filter(|(_, s)| *s >= min && *s <= max).map(|(m, _)| m).collect())
}

pub fn zrangebyscore_withscores(engine: &Engine, key: &str, min: f64, max: f64) -> Result<Vec<(String, f64)>> {
	Ok(ordered_pairs(engine, key).into_iter().filter(|(_, s)| *s >= min && *s <= max).collect())
}

/// Removes members by ascending rank range, returning the count removed.
pub fn zremrangebyrank(engine: &Engine, batches: &BatchPool, key: &str, start: i64, stop: i64) -> Result<i64> {
	let pairs = ordered_pairs(engine, key);
	let (s, e) = resolve_range(pairs.len() as i64, start, stop);
	if s > e {
		return Ok(0);
	}
	let victims: Vec<String> = pairs[s as usize..=e as usize].iter().map(|(m, _)| m.clone()).collect();
	zrem(engine, batches, key, &victims)
}

pub fn zremrangebyscore(engine: &Engine, batches: &BatchPool, key: &str, min: f64, max: f64) -> Result<i64> {
	let victims: Vec<String> = ordered_pairs(engine, key).into_iter().filter(|(_, s)| *s >= min && *s <= max).map(|(m, _)| m).collect();
	zrem(engine, batches, key, &victims)
}

/// Deletes every score/sort entry for `key`, the way `types::delete_any`
/// needs for TTL eviction of a zset.
pub fn clear(engine: &Engine, key: &str) -> Result<()> {
	for composite in scan_prefix(engine, &keys::zset_score_key(key, "")) {
		engine.del(&composite)?;
	}
	for composite in scan_prefix(engine, &keys::zset_sort_prefix(key)) {
		engine.del(&composite)?;
	}
	Ok(())
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
	fn zadd_orders_by_score() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		zadd(&e, &b, "z", "c", 3.0).unwrap();
		zadd(&e, &b, "z", "a", 1.0).unwrap();
		zadd(&e, &b, "z", "b", 2.0).unwrap();
		assert_eq!(zrange(&e, "z", 0, -1).unwrap(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
		assert_eq!(zcard(&e, "z").unwrap(), 3);
	}

	#[test]
	fn zadd_updates_existing_member_rank() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		zadd(&e, &b, "z", "a", 1.0).unwrap();
		zadd(&e, &b, "z", "b", 2.0).unwrap();
		assert!(!zadd(&e, &b, "z", "a", 5.0).unwrap());
		assert_eq!(zrange(&e, "z", 0, -1).unwrap(), vec!["b".to_string(), "a".to_string()]);
		assert_eq!(zscore(&e, "z", "a").unwrap(), Some(5.0));
	}

	#[test]
	fn zincrby_accumulates() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		assert_eq!(zincrby(&e, &b, "z", "a", 1.5).unwrap(), 1.5);
		assert_eq!(zincrby(&e, &b, "z", "a", 2.5).unwrap(), 4.0);
	}

	#[test]
	fn zrank_and_zrevrank() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		zadd(&e, &b, "z", "a", 1.0).unwrap();
		zadd(&e, &b, "z", "b", 2.0).unwrap();
		zadd(&e, &b, "z", "c", 3.0).unwrap();
		assert_eq!(zrank(&e, "z", "b").unwrap(), Some(1));
		assert_eq!(zrevrank(&e, "z", "b").unwrap(), Some(1));
		assert_eq!(zrank(&e, "z", "missing").unwrap(), None);
	}

	#[test]
	fn zrem_is_per_argument() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		zadd(&e, &b, "z", "a", 1.0).unwrap();
		zadd(&e, &b, "z", "b", 2.0).unwrap();
		assert_eq!(zrem(&e, &b, "z", &["a".to_string(), "missing".to_string()]).unwrap(), 1);
		assert_eq!(zcard(&e, "z").unwrap(), 1);
	}

	#[test]
	fn zrangebyscore_filters_inclusive() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		zadd(&e, &b, "z", "a", 1.0).unwrap();
		zadd(&e, &b, "z", "b", 2.0).unwrap();
		zadd(&e, &b, "z", "c", 3.0).unwrap();
		assert_eq!(zrangebyscore(&e, "z", 1.5, 3.0).unwrap(), vec!["b".to_string(), "c".to_string()]);
		assert_eq!(zcount(&e, "z", 1.0, 2.0).unwrap(), 2);
	}

	#[test]
	fn zremrangebyrank_and_byscore() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		zadd(&e, &b, "z", "a", 1.0).unwrap();
		zadd(&e, &b, "z", "b", 2.0).unwrap();
		zadd(&e, &b, "z", "c", 3.0).unwrap();
		assert_eq!(zremrangebyrank(&e, &b, "z", 0, 0).unwrap(), 1);
		assert_eq!(zrange(&e, "z", 0, -1).unwrap(), vec!["b".to_string(), "c".to_string()]);
		assert_eq!(zremrangebyscore(&e, &b, "z", 3.0, 3.0).unwrap(), 1);
		assert_eq!(zcard(&e, "z").unwrap(), 1);
	}

	#[test]
	fn zset_member_rejects_colon() {
		let dir = tempdir().unwrap();
		let (e, b) = open(dir.path());
		assert!(matches!(zadd(&e, &b, "z", "a:b", 1.0), Err(Error::Syntax(_))));
	}
}
