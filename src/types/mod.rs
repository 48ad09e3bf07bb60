// Maps each Redis-like data type onto the flat composite keyspace, via
// free-standing modules (string/hash/list/set/zset) rather than a
// base-class/subclass hierarchy — each module is a capability set
// `{put,get,del,...}` over one shared `Engine`.

pub mod hash;
pub mod keys;
pub mod list;
pub mod set;
pub mod string;
pub mod zset;

use crate::engine::Engine;
use crate::error::Result;

/// The five data types a user key can hold, reported by `TYPE` and used by
/// the TTL coordinator's generalized `exists`/`delete` callbacks (see
/// `ttl.rs`'s module comment) to dispatch across whichever type a key
/// actually is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
	String,
	Hash,
	List,
	Set,
	ZSet,
}

impl KeyKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			KeyKind::String => "string",
			KeyKind::Hash => "hash",
			KeyKind::List => "list",
			KeyKind::Set => "set",
			KeyKind::ZSet => "zset",
		}
	}
}

/// Probes each type's marker key in turn. A key can only ever hold one
/// type at a time (callers are expected to use one type's commands per
/// user key, as Redis does), so the first match wins.
pub fn type_of(engine: &Engine, user_key: &str) -> Result<Option<KeyKind>> {
	if engine.exists(&keys::string_key(user_key))? {
		return Ok(Some(KeyKind::String));
	}
	if engine.exists(&keys::hash_len_key(user_key))? {
		return Ok(Some(KeyKind::Hash));
	}
	if engine.exists(&keys::list_head_key(user_key))? {
		return Ok(Some(KeyKind::List));
	}
	if engine.exists(&keys::set_len_key(user_key))? {
		return Ok(Some(KeyKind::Set));
	}
	if prefix_exists(engine, &keys::zset_score_key(user_key, "")) {
		return Ok(Some(KeyKind::ZSet));
	}
	Ok(None)
}

/// Deletes every composite key belonging to `user_key`, regardless of
/// which of the five types it is. Used by the TTL coordinator's eager
/// sweep/lazy-eviction path, which only knows the user key, not its type.
pub fn delete_any(engine: &Engine, user_key: &str) -> Result<()> {
	match type_of(engine, user_key)? {
		Some(KeyKind::String) => engine.del(&keys::string_key(user_key)),
		Some(KeyKind::Hash) => hash::clear(engine, user_key),
		Some(KeyKind::List) => list::clear(engine, user_key),
		Some(KeyKind::Set) => set::clear(engine, user_key),
		Some(KeyKind::ZSet) => zset::clear(engine, user_key),
		None => Ok(()),
	}
}

/// Returns `true` iff `user_key` currently holds a live value of any type.
/// Used by the TTL coordinator to validate `EXPIRE`/`PERSIST` targets
/// across all five types.
pub fn exists_any(engine: &Engine, user_key: &str) -> Result<bool> {
	Ok(type_of(engine, user_key)?.is_some())
}

/// `true` iff any live index entry's key starts with `prefix`. Short-
/// circuits on the first match; used when the marker itself is a
/// variable-length composite key (zset has no fixed `_len_` key).
pub fn prefix_exists(engine: &Engine, prefix: &str) -> bool {
	let mut found = false;
	engine.index().foreach(|k, _| {
		if k.starts_with(prefix) {
			found = true;
			false
		} else {
			true
		}
	});
	found
}

/// Collects every live composite key starting with `prefix`, in whatever
/// order the index iterates (callers that need a specific order, like
/// zset range queries, sort the result themselves).
pub fn scan_prefix(engine: &Engine, prefix: &str) -> Vec<String> {
	let mut out = Vec::new();
	engine.index().foreach(|k, _| {
		if k.starts_with(prefix) {
			out.push(k.to_string());
		}
		true
	});
	out
}

/// One pass over the whole index, bucketing every composite key into its
/// owning `(user_key, type)` pair. Backs `KEYS`/`TYPE` without requiring a
/// prefix scan per candidate type per key.
///
/// Hash fields and set members are opaque user strings that may themselves
/// contain `:` (see `keys::validate_zset_member`'s doc comment — only zset
/// members carry that restriction), so neither a forward nor a reverse
/// single-colon split of `hash:<k>:<field>`/`set:<k>:<member>` can reliably
/// recover `<k>` when both it and the trailing segment might contain `:`.
/// Instead, each hash/set is registered once via its `_len_` aux key, whose
/// suffix is a known fixed string rather than arbitrary user data, so
/// stripping it unambiguously recovers `<k>` regardless of what either side
/// contains; the per-field/per-member keys are otherwise ignored here.
pub fn all_user_keys(engine: &Engine) -> Vec<(String, KeyKind)> {
	let hash_len_suffix = format!(":{}", keys::HASH_LEN_SUFFIX);
	let set_len_suffix = format!(":{}", keys::SET_LEN_SUFFIX);

	let mut seen = std::collections::HashMap::new();
	engine.index().foreach(|k, _| {
		if let Some(rest) = k.strip_prefix("string:") {
			seen.insert(rest.to_string(), KeyKind::String);
		} else if let Some(rest) = k.strip_prefix("hash:") {
			if let Some(user_key) = rest.strip_suffix(&hash_len_suffix) {
				seen.entry(user_key.to_string()).or_insert(KeyKind::Hash);
			}
		} else if let Some(rest) = k.strip_prefix("list:") {
			if let Some((user_key, _)) = rest.rsplit_once(':') {
				seen.entry(user_key.to_string()).or_insert(KeyKind::List);
			}
		} else if let Some(rest) = k.strip_prefix("set:") {
			if let Some(user_key) = rest.strip_suffix(&set_len_suffix) {
				seen.entry(user_key.to_string()).or_insert(KeyKind::Set);
			}
		} else if let Some(rest) = k.strip_prefix("zset:") {
			if let Some((user_key, _)) = rest.split_once(':') {
				seen.entry(user_key.to_string()).or_insert(KeyKind::ZSet);
			}
		}
		true
	});
	seen.into_iter().collect()
}

/// Minimal shell-style glob matcher supporting `*`, `?`, and `[...]`
/// character classes, for the `KEYS <pattern>` command. Iterative rather
/// than regex-based, since the alphabet is small and patterns are
/// short-lived, one-shot matches.
pub fn glob_match(pattern: &str, text: &str) -> bool {
	let p: Vec<char> = pattern.chars().collect();
	let t: Vec<char> = text.chars().collect();
	glob_match_at(&p, &t)
}

fn glob_match_at(p: &[char], t: &[char]) -> bool {
	if p.is_empty() {
		return t.is_empty();
	}
	match p[0] {
		'*' => {
			// Try consuming zero or more characters of `t`.
			if glob_match_at(&p[1..], t) {
				return true;
			}
			!t.is_empty() && glob_match_at(p, &t[1..])
		}
		'?' => !t.is_empty() && glob_match_at(&p[1..], &t[1..]),
		'[' => match p.iter().position(|&c| c == ']') {
			Some(close) if close > 0 => {
				if t.is_empty() {
					return false;
				}
				let class = &p[1..close];
				let (negate, class) = match class.first() {
					Some('^') => (true, &class[1..]),
					_ => (false, class),
				};
				let matched = char_class_matches(class, t[0]);
				if matched != negate {
					glob_match_at(&p[close + 1..], &t[1..])
				} else {
					false
				}
			}
			_ => !t.is_empty() && p[0] == t[0] && glob_match_at(&p[1..], &t[1..]),
		},
		c => !t.is_empty() && t[0] == c && glob_match_at(&p[1..], &t[1..]),
	}
}

fn char_class_matches(class: &[char], c: char) -> bool {
	let mut i = 0;
	while i < class.len() {
		if i + 2 < class.len() && class[i + 1] == '-' {
			if c >= class[i] && c <= class[i + 2] {
				return true;
			}
			i += 3;
		} else {
			if class[i] == c {
				return true;
			}
			i += 1;
		}
	}
	false
}

pub fn parse_int(bytes: &[u8]) -> Result<i64> {
	std::str::from_utf8(bytes).ok().and_then(|s| s.parse::<i64>().ok()).ok_or(crate::error::Error::NotAnInteger)
}

pub fn parse_float(bytes: &[u8]) -> Result<f64> {
	std::str::from_utf8(bytes).ok().and_then(|s| s.parse::<f64>().ok()).ok_or(crate::error::Error::NotAFloat)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::batch::BatchPool;
	use crate::options::Options;
	use std::sync::Arc;
	use tempfile::tempdir;

	fn open_engine(dir: &std::path::Path) -> Arc<Engine> {
		let mut opts = Options::default();
		opts.data_dir = dir.to_path_buf();
		Arc::new(Engine::open(opts).unwrap())
	}

	#[test]
	fn all_user_keys_handles_colons_in_hash_fields_and_set_members() {
		let dir = tempdir().unwrap();
		let engine = open_engine(dir.path());
		let batches = BatchPool::new(engine.clone());

		hash::hset(&engine, &batches, "h", "a:b", b"v").unwrap();
		set::sadd(&engine, &batches, "s", &["x:y".to_string()]).unwrap();

		let mut found = all_user_keys(&engine);
		found.sort_by(|a, b| a.0.cmp(&b.0));
		assert_eq!(found, vec![("h".to_string(), KeyKind::Hash), ("s".to_string(), KeyKind::Set)]);
	}

	#[test]
	fn glob_star_matches_any_suffix() {
		assert!(glob_match("user:*", "user:42"));
		assert!(glob_match("*", ""));
		assert!(!glob_match("user:*", "other:1"));
	}

	#[test]
	fn glob_question_matches_one_char() {
		assert!(glob_match("k?y", "key"));
		assert!(!glob_match("k?y", "kzzy"));
	}

	#[test]
	fn glob_char_class() {
		assert!(glob_match("k[ae]y", "kay"));
		assert!(glob_match("k[ae]y", "key"));
		assert!(!glob_match("k[ae]y", "kiy"));
		assert!(glob_match("k[^ae]y", "kiy"));
	}
}
