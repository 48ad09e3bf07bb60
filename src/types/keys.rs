// Composite key encoding: maps each Redis-like type onto the flat string
// keyspace the engine actually stores (`string:<k>`, `hash:<k>:<field>`,
// `list:<k>:<idx>`, `set:<k>:<m>`, `zset:<k>:<m>` /
// `zset:<k>:s:<hex>:<m>`).

pub const HASH_LEN_SUFFIX: &str = "_len_";
pub const LIST_LEN_SUFFIX: &str = "_len_";
pub const LIST_HEAD_SUFFIX: &str = "_head_";
pub const LIST_TAIL_SUFFIX: &str = "_tail_";
pub const SET_LEN_SUFFIX: &str = "_len_";

pub fn string_key(key: &str) -> String {
	format!("string:{}", key)
}

pub fn hash_prefix(key: &str) -> String {
	format!("hash:{}:", key)
}

pub fn hash_field_key(key: &str, field: &str) -> String {
	format!("hash:{}:{}", key, field)
}

pub fn hash_len_key(key: &str) -> String {
	format!("hash:{}:{}", key, HASH_LEN_SUFFIX)
}

pub fn list_prefix(key: &str) -> String {
	format!("list:{}:", key)
}

pub fn list_item_key(key: &str, idx: i64) -> String {
	format!("list:{}:{}", key, idx)
}

pub fn list_len_key(key: &str) -> String {
	format!("list:{}:{}", key, LIST_LEN_SUFFIX)
}

pub fn list_head_key(key: &str) -> String {
	format!("list:{}:{}", key, LIST_HEAD_SUFFIX)
}

pub fn list_tail_key(key: &str) -> String {
	format!("list:{}:{}", key, LIST_TAIL_SUFFIX)
}

pub fn set_prefix(key: &str) -> String {
	format!("set:{}:", key)
}

pub fn set_member_key(key: &str, member: &str) -> String {
	format!("set:{}:{}", key, member)
}

pub fn set_len_key(key: &str) -> String {
	format!("set:{}:{}", key, SET_LEN_SUFFIX)
}

pub fn zset_score_key(key: &str, member: &str) -> String {
	format!("zset:{}:{}", key, member)
}

pub fn zset_sort_prefix(key: &str) -> String {
	format!("zset:{}:s:", key)
}

pub fn zset_sort_key(key: &str, score: f64, member: &str) -> String {
	format!("zset:{}:s:{}:{}", key, encode_score_hex(score), member)
}

/// Splits a `zset:<k>:s:<hex>:<m>` sort key (with the `zset:<k>:s:` prefix
/// already stripped) into `(hex, member)`. Safe because members are
/// rejected at `zadd`/`zincrby` time if they contain `:` (see
/// `validate_member`), so the first remaining colon always separates the
/// hex score from the member.
pub fn split_sort_suffix(suffix: &str) -> Option<(&str, &str)> {
	let mut parts = suffix.splitn(2, ':');
	let hex = parts.next()?;
	let member = parts.next()?;
	Some((hex, member))
}

/// Rejects members that would make a zset sort key ambiguous. Only zset
/// members carry this restriction; hash fields, list values, and set
/// members are plain opaque strings.
pub fn validate_zset_member(member: &str) -> crate::error::Result<()> {
	if member.contains(':') {
		return Err(crate::error::Error::Syntax("zset members may not contain ':'".to_string()));
	}
	Ok(())
}

/// Encodes a score so that byte-lexicographic order over the hex string
/// matches numeric order: non-negative scores get their sign bit set,
/// negative scores are bitwise-inverted. Both transforms are
/// self-inverse-paired with `decode_score_hex`.
pub fn encode_score_hex(score: f64) -> String {
	let bits = score.to_bits();
	let encoded = if score < 0.0 { !bits } else { bits | (1u64 << 63) };
	format!("{:016x}", encoded)
}

pub fn decode_score_hex(hex: &str) -> Option<f64> {
	let encoded = u64::from_str_radix(hex, 16).ok()?;
	let bits = if encoded & (1u64 << 63) != 0 { encoded & !(1u64 << 63) } else { !encoded };
	Some(f64::from_bits(bits))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn score_hex_roundtrips() {
		for score in [0.0, -0.0, 1.0, -1.0, 3.5, -3.5, f64::MAX, f64::MIN, 1e100, -1e100] {
			let hex = encode_score_hex(score);
			let back = decode_score_hex(&hex).unwrap();
			assert_eq!(back, score, "score {} roundtrip via {}", score, hex);
		}
	}

	#[test]
	fn score_hex_preserves_numeric_order() {
		let scores = [-100.0, -1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5, 100.0];
		let mut hexes: Vec<String> = scores.iter().map(|s| encode_score_hex(*s)).collect();
		let sorted = {
			let mut h = hexes.clone();
			h.sort();
			h
		};
		assert_eq!(hexes, sorted);
		hexes.dedup();
		assert_eq!(hexes.len(), scores.len());
	}

	#[test]
	fn split_sort_suffix_separates_hex_and_member() {
		assert_eq!(split_sort_suffix("00ff:alice"), Some(("00ff", "alice")));
		assert_eq!(split_sort_suffix("00ff:"), Some(("00ff", "")));
		assert_eq!(split_sort_suffix("00ff"), None);
	}

	#[test]
	fn validate_zset_member_rejects_colon() {
		assert!(validate_zset_member("ok").is_ok());
		assert!(validate_zset_member("not:ok").is_err());
	}
}
