// Maps a decoded RESP `Command` onto the engine operations exposed by
// `fincas::Database` and its `types::*` accessors, validating argument
// counts/types before touching the store — wrong-arg-count and syntax
// errors are returned without touching the engine.

use std::time::Duration;

use fincas::error::Error as DbError;
use fincas::types::{hash, list, set, string, zset};
use fincas::Database;

use crate::resp::{Command, Reply};

fn db_err(e: DbError) -> Reply {
	Reply::Error(format!("ERR {}", e))
}

fn wrong_args() -> Reply {
	Reply::Error("ERR wrong number of arguments".to_string())
}

fn syntax_error() -> Reply {
	Reply::Error("ERR syntax error".to_string())
}

fn utf8(bytes: &[u8]) -> Result<&str, Reply> {
	std::str::from_utf8(bytes).map_err(|_| Reply::Error("ERR invalid UTF-8 argument".to_string()))
}

fn parse_i64(bytes: &[u8]) -> Result<i64, Reply> {
	utf8(bytes)?.parse::<i64>().map_err(|_| Reply::Error("ERR value is not an integer or out of range".to_string()))
}

fn parse_f64(bytes: &[u8]) -> Result<f64, Reply> {
	utf8(bytes)?.parse::<f64>().map_err(|_| Reply::Error("ERR value is not a valid float".to_string()))
}

fn opt_vec(v: Option<Vec<u8>>) -> Reply {
	match v {
		Some(bytes) => Reply::Bulk(bytes),
		None => Reply::Nil,
	}
}

macro_rules! require_argc {
	($args:expr, $n:expr) => {
		if $args.len() != $n {
			return wrong_args();
		}
	};
}

macro_rules! require_min_argc {
	($args:expr, $n:expr) => {
		if $args.len() < $n {
			return wrong_args();
		}
	};
}

pub fn dispatch(db: &Database, cmd: Command) -> Reply {
	let args = &cmd.args;
	match cmd.name.as_str() {
		"PING" => Reply::Simple("PONG".to_string()),

		// --- strings ---
		"SET" => {
			require_argc!(args, 2);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match string::set(db.engine(), key, &args[1]) {
				Ok(()) => Reply::ok(),
				Err(e) => db_err(e),
			}
		}
		"GET" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			db.ttl().check_and_evict(key);
			match string::get(db.engine(), key) {
				Ok(v) => Reply::Bulk(v),
				Err(DbError::KeyNotFound) => Reply::Nil,
				Err(e) => db_err(e),
			}
		}
		"DEL" => {
			require_min_argc!(args, 1);
			let mut removed = 0i64;
			for arg in args {
				let key = match utf8(arg) {
					Ok(k) => k,
					Err(r) => return r,
				};
				db.ttl().check_and_evict(key);
				match fincas::types::exists_any(db.engine(), key) {
					Ok(true) => {
						if let Err(e) = fincas::types::delete_any(db.engine(), key) {
							return db_err(e);
						}
						removed += 1;
					}
					Ok(false) => {}
					Err(e) => return db_err(e),
				}
			}
			Reply::Integer(removed)
		}
		"INCR" => numeric_delta(db, args, 1),
		"DECR" => numeric_delta(db, args, -1),
		"INCRBY" => {
			require_argc!(args, 2);
			let delta = match parse_i64(&args[1]) {
				Ok(n) => n,
				Err(r) => return r,
			};
			numeric_delta(db, &args[..1], delta)
		}
		"DECRBY" => {
			require_argc!(args, 2);
			let delta = match parse_i64(&args[1]) {
				Ok(n) => n,
				Err(r) => return r,
			};
			numeric_delta(db, &args[..1], -delta)
		}
		"APPEND" => {
			require_argc!(args, 2);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match string::append(db.engine(), key, &args[1]) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"GETSET" => {
			require_argc!(args, 2);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match string::getset(db.engine(), key, &args[1]) {
				Ok(prior) => opt_vec(prior),
				Err(e) => db_err(e),
			}
		}
		"SETNX" => {
			require_argc!(args, 2);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match string::setnx(db.engine(), key, &args[1]) {
				Ok(created) => Reply::Integer(created as i64),
				Err(e) => db_err(e),
			}
		}
		"MSET" => {
			require_min_argc!(args, 2);
			if args.len() % 2 != 0 {
				return wrong_args();
			}
			let mut pairs = Vec::with_capacity(args.len() / 2);
			for chunk in args.chunks(2) {
				let key = match utf8(&chunk[0]) {
					Ok(k) => k.to_string(),
					Err(r) => return r,
				};
				pairs.push((key, chunk[1].clone()));
			}
			match string::mset(db.engine(), &pairs) {
				Ok(()) => Reply::ok(),
				Err(e) => db_err(e),
			}
		}
		"MGET" => {
			require_min_argc!(args, 1);
			let mut keys_in = Vec::with_capacity(args.len());
			for arg in args {
				match utf8(arg) {
					Ok(k) => keys_in.push(k.to_string()),
					Err(r) => return r,
				}
			}
			match string::mget(db.engine(), &keys_in) {
				Ok(values) => Reply::Array(values.into_iter().map(opt_vec).collect()),
				Err(e) => db_err(e),
			}
		}
		"STRLEN" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match string::strlen(db.engine(), key) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}

		// --- hashes ---
		"HSET" => {
			require_argc!(args, 3);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let field = match utf8(&args[1]) {
				Ok(f) => f,
				Err(r) => return r,
			};
			match hash::hset(db.engine(), db.batches(), key, field, &args[2]) {
				Ok(created) => Reply::Integer(created as i64),
				Err(e) => db_err(e),
			}
		}
		"HMSET" => {
			require_min_argc!(args, 3);
			if (args.len() - 1) % 2 != 0 {
				return wrong_args();
			}
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let mut fields = Vec::new();
			for chunk in args[1..].chunks(2) {
				let field = match utf8(&chunk[0]) {
					Ok(f) => f.to_string(),
					Err(r) => return r,
				};
				fields.push((field, chunk[1].clone()));
			}
			match hash::hmset(db.engine(), db.batches(), key, &fields) {
				Ok(()) => Reply::ok(),
				Err(e) => db_err(e),
			}
		}
		"HGET" => {
			require_argc!(args, 2);
			let (key, field) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			match hash::hget(db.engine(), key, field) {
				Ok(v) => Reply::Bulk(v),
				Err(DbError::KeyNotFound) => Reply::Nil,
				Err(e) => db_err(e),
			}
		}
		"HMGET" => {
			require_min_argc!(args, 2);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let mut fields = Vec::new();
			for arg in &args[1..] {
				match utf8(arg) {
					Ok(f) => fields.push(f.to_string()),
					Err(r) => return r,
				}
			}
			match hash::hmget(db.engine(), key, &fields) {
				Ok(values) => Reply::Array(values.into_iter().map(opt_vec).collect()),
				Err(e) => db_err(e),
			}
		}
		"HDEL" => {
			require_min_argc!(args, 2);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let mut fields = Vec::new();
			for arg in &args[1..] {
				match utf8(arg) {
					Ok(f) => fields.push(f.to_string()),
					Err(r) => return r,
				}
			}
			match hash::hdel(db.engine(), db.batches(), key, &fields) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"HEXISTS" => {
			require_argc!(args, 2);
			let (key, field) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			match hash::hexists(db.engine(), key, field) {
				Ok(b) => Reply::Integer(b as i64),
				Err(e) => db_err(e),
			}
		}
		"HKEYS" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match hash::hkeys(db.engine(), key) {
				Ok(fs) => Reply::from_strings(fs),
				Err(e) => db_err(e),
			}
		}
		"HVALS" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match hash::hvals(db.engine(), key) {
				Ok(vs) => Reply::Array(vs.into_iter().map(Reply::Bulk).collect()),
				Err(e) => db_err(e),
			}
		}
		"HGETALL" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match hash::hgetall(db.engine(), key) {
				Ok(pairs) => {
					let mut flat = Vec::with_capacity(pairs.len() * 2);
					for (f, v) in pairs {
						flat.push(Reply::bulk(f));
						flat.push(Reply::Bulk(v));
					}
					Reply::Array(flat)
				}
				Err(e) => db_err(e),
			}
		}
		"HLEN" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match hash::hlen(db.engine(), key) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"HINCRBY" => {
			require_argc!(args, 3);
			let (key, field) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			let delta = match parse_i64(&args[2]) {
				Ok(n) => n,
				Err(r) => return r,
			};
			match hash::hincrby(db.engine(), db.batches(), key, field, delta) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"HINCRBYFLOAT" => {
			require_argc!(args, 3);
			let (key, field) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			let delta = match parse_f64(&args[2]) {
				Ok(n) => n,
				Err(r) => return r,
			};
			match hash::hincrbyfloat(db.engine(), db.batches(), key, field, delta) {
				Ok(n) => Reply::bulk(n.to_string()),
				Err(e) => db_err(e),
			}
		}
		"HSETNX" => {
			require_argc!(args, 3);
			let (key, field) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			match hash::hsetnx(db.engine(), db.batches(), key, field, &args[2]) {
				Ok(created) => Reply::Integer(created as i64),
				Err(e) => db_err(e),
			}
		}
		"HSTRLEN" => {
			require_argc!(args, 2);
			let (key, field) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			match hash::hstrlen(db.engine(), key, field) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}

		// --- lists ---
		"LPUSH" => push(db, args, true),
		"RPUSH" => push(db, args, false),
		"LPOP" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match list::lpop(db.engine(), db.batches(), key) {
				Ok(v) => Reply::Bulk(v),
				Err(DbError::KeyNotFound) => Reply::Nil,
				Err(e) => db_err(e),
			}
		}
		"RPOP" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match list::rpop(db.engine(), db.batches(), key) {
				Ok(v) => Reply::Bulk(v),
				Err(DbError::KeyNotFound) => Reply::Nil,
				Err(e) => db_err(e),
			}
		}
		"LLEN" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match list::llen(db.engine(), key) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"LRANGE" => {
			require_argc!(args, 3);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let (start, stop) = match (parse_i64(&args[1]), parse_i64(&args[2])) {
				(Ok(a), Ok(b)) => (a, b),
				(Err(r), _) | (_, Err(r)) => return r,
			};
			match list::lrange(db.engine(), key, start, stop) {
				Ok(items) => Reply::Array(items.into_iter().map(Reply::Bulk).collect()),
				Err(e) => db_err(e),
			}
		}
		"LTRIM" => {
			require_argc!(args, 3);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let (start, stop) = match (parse_i64(&args[1]), parse_i64(&args[2])) {
				(Ok(a), Ok(b)) => (a, b),
				(Err(r), _) | (_, Err(r)) => return r,
			};
			match list::ltrim(db.engine(), db.batches(), key, start, stop) {
				Ok(()) => Reply::ok(),
				Err(e) => db_err(e),
			}
		}
		"BLPOP" => blocking_pop(db, args, true),
		"BRPOP" => blocking_pop(db, args, false),
		"LINSERT" => {
			require_argc!(args, 4);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let before = match utf8(&args[1]) {
				Ok(s) if s.eq_ignore_ascii_case("before") => true,
				Ok(s) if s.eq_ignore_ascii_case("after") => false,
				_ => return syntax_error(),
			};
			match list::linsert(db.engine(), db.batches(), key, before, &args[2], &args[3]) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}

		// --- sets ---
		"SADD" => {
			require_min_argc!(args, 2);
			let (key, members) = match key_and_strings(args) {
				Ok(km) => km,
				Err(r) => return r,
			};
			match set::sadd(db.engine(), db.batches(), key, &members) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"SREM" => {
			require_min_argc!(args, 2);
			let (key, members) = match key_and_strings(args) {
				Ok(km) => km,
				Err(r) => return r,
			};
			match set::srem(db.engine(), db.batches(), key, &members) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"SISMEMBER" => {
			require_argc!(args, 2);
			let (key, member) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			match set::sismember(db.engine(), key, member) {
				Ok(b) => Reply::Integer(b as i64),
				Err(e) => db_err(e),
			}
		}
		"SMEMBERS" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match set::smembers(db.engine(), key) {
				Ok(ms) => Reply::from_strings(ms),
				Err(e) => db_err(e),
			}
		}
		"SCARD" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match set::scard(db.engine(), key) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"SPOP" => {
			require_min_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let count = if args.len() > 1 {
				match parse_i64(&args[1]) {
					Ok(n) if n >= 0 => n as usize,
					Ok(_) => return syntax_error(),
					Err(r) => return r,
				}
			} else {
				1
			};
			match set::spop(db.engine(), db.batches(), key, count) {
				Ok(popped) => {
					if args.len() > 1 {
						Reply::from_strings(popped)
					} else {
						match popped.into_iter().next() {
							Some(m) => Reply::bulk(m),
							None => Reply::Nil,
						}
					}
				}
				Err(e) => db_err(e),
			}
		}
		"SRANDMEMBER" => {
			require_min_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let count = if args.len() > 1 {
				match parse_i64(&args[1]) {
					Ok(n) => n,
					Err(r) => return r,
				}
			} else {
				1
			};
			match set::srandmember(db.engine(), key, count) {
				Ok(ms) => {
					if args.len() > 1 {
						Reply::from_strings(ms)
					} else {
						match ms.into_iter().next() {
							Some(m) => Reply::bulk(m),
							None => Reply::Nil,
						}
					}
				}
				Err(e) => db_err(e),
			}
		}
		"SDIFF" => set_algebra(db, args, set::sdiff),
		"SUNION" => set_algebra(db, args, set::sunion),
		"SINTER" => set_algebra(db, args, set::sinter),
		"SMOVE" => {
			require_argc!(args, 3);
			let source = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let destination = match utf8(&args[1]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let member = match utf8(&args[2]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match set::smove(db.engine(), db.batches(), source, destination, member) {
				Ok(moved) => Reply::Integer(moved as i64),
				Err(e) => db_err(e),
			}
		}

		// --- sorted sets ---
		"ZADD" => {
			require_min_argc!(args, 3);
			if (args.len() - 1) % 2 != 0 {
				return wrong_args();
			}
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let mut added = 0i64;
			for chunk in args[1..].chunks(2) {
				let score = match parse_f64(&chunk[0]) {
					Ok(s) => s,
					Err(r) => return r,
				};
				let member = match utf8(&chunk[1]) {
					Ok(m) => m,
					Err(r) => return r,
				};
				match zset::zadd(db.engine(), db.batches(), key, member, score) {
					Ok(created) => {
						if created {
							added += 1;
						}
					}
					Err(e) => return db_err(e),
				}
			}
			Reply::Integer(added)
		}
		"ZRANGE" => zrange_cmd(db, args, false, false),
		"ZREVRANGE" => zrange_cmd(db, args, true, false),
		"ZRANGEWITHSCORES" => zrange_cmd(db, args, false, true),
		"ZREVRANGEWITHSCORES" => zrange_cmd(db, args, true, true),
		"ZRANK" => {
			require_argc!(args, 2);
			let (key, member) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			match zset::zrank(db.engine(), key, member) {
				Ok(Some(r)) => Reply::Integer(r),
				Ok(None) => Reply::Nil,
				Err(e) => db_err(e),
			}
		}
		"ZREVRANK" => {
			require_argc!(args, 2);
			let (key, member) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			match zset::zrevrank(db.engine(), key, member) {
				Ok(Some(r)) => Reply::Integer(r),
				Ok(None) => Reply::Nil,
				Err(e) => db_err(e),
			}
		}
		"ZREM" => {
			require_min_argc!(args, 2);
			let (key, members) = match key_and_strings(args) {
				Ok(km) => km,
				Err(r) => return r,
			};
			match zset::zrem(db.engine(), db.batches(), key, &members) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"ZCARD" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match zset::zcard(db.engine(), key) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"ZSCORE" => {
			require_argc!(args, 2);
			let (key, member) = match key_field(args) {
				Ok(kf) => kf,
				Err(r) => return r,
			};
			match zset::zscore(db.engine(), key, member) {
				Ok(Some(s)) => Reply::bulk(s.to_string()),
				Ok(None) => Reply::Nil,
				Err(e) => db_err(e),
			}
		}
		"ZINCRBY" => {
			require_argc!(args, 3);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let delta = match parse_f64(&args[1]) {
				Ok(d) => d,
				Err(r) => return r,
			};
			let member = match utf8(&args[2]) {
				Ok(m) => m,
				Err(r) => return r,
			};
			match zset::zincrby(db.engine(), db.batches(), key, member, delta) {
				Ok(s) => Reply::bulk(s.to_string()),
				Err(e) => db_err(e),
			}
		}
		"ZRANGEBYSCORE" => zrangebyscore_cmd(db, args),
		"ZCOUNT" => {
			require_argc!(args, 3);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let (min, max) = match (parse_f64(&args[1]), parse_f64(&args[2])) {
				(Ok(a), Ok(b)) => (a, b),
				(Err(r), _) | (_, Err(r)) => return r,
			};
			match zset::zcount(db.engine(), key, min, max) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"ZREMRANGEBYRANK" => {
			require_argc!(args, 3);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let (start, stop) = match (parse_i64(&args[1]), parse_i64(&args[2])) {
				(Ok(a), Ok(b)) => (a, b),
				(Err(r), _) | (_, Err(r)) => return r,
			};
			match zset::zremrangebyrank(db.engine(), db.batches(), key, start, stop) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}
		"ZREMRANGEBYSCORE" => {
			require_argc!(args, 3);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let (min, max) = match (parse_f64(&args[1]), parse_f64(&args[2])) {
				(Ok(a), Ok(b)) => (a, b),
				(Err(r), _) | (_, Err(r)) => return r,
			};
			match zset::zremrangebyscore(db.engine(), db.batches(), key, min, max) {
				Ok(n) => Reply::Integer(n),
				Err(e) => db_err(e),
			}
		}

		// --- key introspection and expiry ---
		"EXISTS" => {
			require_min_argc!(args, 1);
			let mut count = 0i64;
			for arg in args {
				let key = match utf8(arg) {
					Ok(k) => k,
					Err(r) => return r,
				};
				match db.exists(key) {
					Ok(true) => count += 1,
					Ok(false) => {}
					Err(e) => return db_err(e),
				}
			}
			Reply::Integer(count)
		}
		"TYPE" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match db.type_of(key) {
				Ok(Some(kind)) => Reply::Simple(kind.as_str().to_string()),
				Ok(None) => Reply::Simple("none".to_string()),
				Err(e) => db_err(e),
			}
		}
		"KEYS" => {
			require_argc!(args, 1);
			let pattern = match utf8(&args[0]) {
				Ok(p) => p,
				Err(r) => return r,
			};
			match db.keys(pattern) {
				Ok(ks) => Reply::from_strings(ks),
				Err(e) => db_err(e),
			}
		}
		"EXPIRE" => {
			require_argc!(args, 2);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			let seconds = match parse_i64(&args[1]) {
				Ok(n) => n,
				Err(r) => return r,
			};
			if seconds <= 0 {
				return db_err(DbError::InvalidTtl);
			}
			match db.expire(key, Duration::from_secs(seconds as u64)) {
				Ok(()) => Reply::Integer(1),
				Err(DbError::KeyNotFound) => Reply::Integer(0),
				Err(e) => db_err(e),
			}
		}
		"PERSIST" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match db.persist(key) {
				Ok(()) => Reply::Integer(1),
				Err(DbError::KeyNotFound) => Reply::Integer(0),
				Err(e) => db_err(e),
			}
		}
		"TTL" => {
			require_argc!(args, 1);
			let key = match utf8(&args[0]) {
				Ok(k) => k,
				Err(r) => return r,
			};
			match db.ttl_millis(key) {
				Ok(Some(ms)) => Reply::Integer(ms / 1000),
				Ok(None) => Reply::Integer(-1),
				Err(e) => db_err(e),
			}
		}

		other => Reply::Error(format!("ERR unknown command '{}'", other)),
	}
}

fn key_field<'a>(args: &'a [Vec<u8>]) -> Result<(&'a str, &'a str), Reply> {
	Ok((utf8(&args[0])?, utf8(&args[1])?))
}

fn key_and_strings(args: &[Vec<u8>]) -> Result<(&str, Vec<String>), Reply> {
	let key = utf8(&args[0])?;
	let mut items = Vec::with_capacity(args.len() - 1);
	for arg in &args[1..] {
		items.push(utf8(arg)?.to_string());
	}
	Ok((key, items))
}

fn numeric_delta(db: &Database, args: &[Vec<u8>], delta: i64) -> Reply {
	if args.len() != 1 {
		return wrong_args();
	}
	let key = match utf8(&args[0]) {
		Ok(k) => k,
		Err(r) => return r,
	};
	match string::incrby(db.engine(), key, delta) {
		Ok(n) => Reply::Integer(n),
		Err(e) => db_err(e),
	}
}

fn push(db: &Database, args: &[Vec<u8>], head: bool) -> Reply {
	if args.len() < 2 {
		return wrong_args();
	}
	let key = match utf8(&args[0]) {
		Ok(k) => k,
		Err(r) => return r,
	};
	let values: Vec<Vec<u8>> = args[1..].to_vec();
	let result = if head { list::lpush(db.engine(), db.batches(), key, &values) } else { list::rpush(db.engine(), db.batches(), key, &values) };
	match result {
		Ok(n) => Reply::Integer(n),
		Err(e) => db_err(e),
	}
}

fn blocking_pop(db: &Database, args: &[Vec<u8>], head: bool) -> Reply {
	if args.len() < 2 {
		return wrong_args();
	}
	let timeout_secs = match parse_f64(&args[args.len() - 1]) {
		Ok(s) => s,
		Err(r) => return r,
	};
	let mut keys_in = Vec::with_capacity(args.len() - 1);
	for arg in &args[..args.len() - 1] {
		match utf8(arg) {
			Ok(k) => keys_in.push(k.to_string()),
			Err(r) => return r,
		}
	}
	let timeout = Duration::from_secs_f64(timeout_secs.max(0.0));
	let result = if head { list::blpop(db.engine(), db.batches(), &keys_in, timeout) } else { list::brpop(db.engine(), db.batches(), &keys_in, timeout) };
	match result {
		Ok(Some((key, value))) => Reply::Array(vec![Reply::bulk(key), Reply::Bulk(value)]),
		Ok(None) => Reply::NilArray,
		Err(e) => db_err(e),
	}
}

fn set_algebra(db: &Database, args: &[Vec<u8>], f: fn(&fincas::Engine, &[String]) -> fincas::Result<Vec<String>>) -> Reply {
	if args.is_empty() {
		return wrong_args();
	}
	let mut keys_in = Vec::with_capacity(args.len());
	for arg in args {
		match utf8(arg) {
			Ok(k) => keys_in.push(k.to_string()),
			Err(r) => return r,
		}
	}
	match f(db.engine(), &keys_in) {
		Ok(members) => Reply::from_strings(members),
		Err(e) => db_err(e),
	}
}

fn zrange_cmd(db: &Database, args: &[Vec<u8>], reverse: bool, withscores: bool) -> Reply {
	if args.len() != 3 {
		return wrong_args();
	}
	let key = match utf8(&args[0]) {
		Ok(k) => k,
		Err(r) => return r,
	};
	let (start, stop) = match (parse_i64(&args[1]), parse_i64(&args[2])) {
		(Ok(a), Ok(b)) => (a, b),
		(Err(r), _) | (_, Err(r)) => return r,
	};
	if withscores {
		let result = if reverse { zset::zrevrange_withscores(db.engine(), key, start, stop) } else { zset::zrange_withscores(db.engine(), key, start, stop) };
		match result {
			Ok(pairs) => {
				let mut flat = Vec::with_capacity(pairs.len() * 2);
				for (m, s) in pairs {
					flat.push(Reply::bulk(m));
					flat.push(Reply::bulk(s.to_string()));
				}
				Reply::Array(flat)
			}
			Err(e) => db_err(e),
		}
	} else {
		let result = if reverse { zset::zrevrange(db.engine(), key, start, stop) } else { zset::zrange(db.engine(), key, start, stop) };
		match result {
			Ok(members) => Reply::from_strings(members),
			Err(e) => db_err(e),
		}
	}
}

fn zrangebyscore_cmd(db: &Database, args: &[Vec<u8>]) -> Reply {
	if args.len() < 3 || args.len() > 4 {
		return wrong_args();
	}
	let key = match utf8(&args[0]) {
		Ok(k) => k,
		Err(r) => return r,
	};
	let (min, max) = match (parse_f64(&args[1]), parse_f64(&args[2])) {
		(Ok(a), Ok(b)) => (a, b),
		(Err(r), _) | (_, Err(r)) => return r,
	};
	let withscores = if args.len() == 4 {
		match utf8(&args[3]) {
			Ok(s) if s.eq_ignore_ascii_case("withscores") => true,
			_ => return syntax_error(),
		}
	} else {
		false
	};
	if withscores {
		match zset::zrangebyscore_withscores(db.engine(), key, min, max) {
			Ok(pairs) => {
				let mut flat = Vec::with_capacity(pairs.len() * 2);
				for (m, s) in pairs {
					flat.push(Reply::bulk(m));
					flat.push(Reply::bulk(s.to_string()));
				}
				Reply::Array(flat)
			}
			Err(e) => db_err(e),
		}
	} else {
		match zset::zrangebyscore(db.engine(), key, min, max) {
			Ok(members) => Reply::from_strings(members),
			Err(e) => db_err(e),
		}
	}
}
