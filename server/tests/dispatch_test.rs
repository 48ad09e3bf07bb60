// Integration coverage for the command dispatcher, exercising end-to-end
// command scenarios through the dispatcher rather than the RESP wire
// (the wire codec itself is covered by `resp.rs`'s unit tests).

use std::sync::Arc;

use fincas::{Database, DbOptions, Options};
use fincas_server::dispatch::dispatch;
use fincas_server::resp::{Command, Reply};
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> Arc<Database> {
	let mut opts = Options::default();
	opts.data_dir = dir.to_path_buf();
	opts.auto_merge = false;
	Database::open(opts, DbOptions::default()).unwrap()
}

fn cmd(name: &str, args: &[&str]) -> Command {
	Command { name: name.to_string(), args: args.iter().map(|a| a.as_bytes().to_vec()).collect() }
}

fn as_bulk(reply: Reply) -> Vec<u8> {
	match reply {
		Reply::Bulk(b) => b,
		other => panic!("expected bulk reply, got {:?}", debug_kind(&other)),
	}
}

fn as_int(reply: Reply) -> i64 {
	match reply {
		Reply::Integer(n) => n,
		other => panic!("expected integer reply, got {:?}", debug_kind(&other)),
	}
}

fn debug_kind(r: &Reply) -> &'static str {
	match r {
		Reply::Simple(_) => "simple",
		Reply::Error(_) => "error",
		Reply::Integer(_) => "integer",
		Reply::Bulk(_) => "bulk",
		Reply::Nil => "nil",
		Reply::Array(_) => "array",
		Reply::NilArray => "nil-array",
	}
}

fn flat_strings(reply: Reply) -> Vec<String> {
	match reply {
		Reply::Array(items) => items
			.into_iter()
			.map(|i| match i {
				Reply::Bulk(b) => String::from_utf8(b).unwrap(),
				_ => panic!("expected bulk item in array"),
			})
			.collect(),
		other => panic!("expected array reply, got {:?}", debug_kind(&other)),
	}
}

#[test]
fn scenario_1_string_set_get_append() {
	let dir = tempdir().unwrap();
	let db = open(dir.path());
	assert!(matches!(dispatch(&db, cmd("SET", &["foo", "bar"])), Reply::Simple(s) if s == "OK"));
	assert_eq!(as_bulk(dispatch(&db, cmd("GET", &["foo"]))), b"bar");
	assert_eq!(as_int(dispatch(&db, cmd("STRLEN", &["foo"]))), 3);
	assert_eq!(as_int(dispatch(&db, cmd("APPEND", &["foo", "baz"]))), 6);
	assert_eq!(as_bulk(dispatch(&db, cmd("GET", &["foo"]))), b"barbaz");
}

#[test]
fn scenario_2_incr_decr_then_not_an_integer() {
	let dir = tempdir().unwrap();
	let db = open(dir.path());
	assert_eq!(as_int(dispatch(&db, cmd("INCR", &["counter"]))), 1);
	assert_eq!(as_int(dispatch(&db, cmd("INCRBY", &["counter", "10"]))), 11);
	assert_eq!(as_int(dispatch(&db, cmd("DECR", &["counter"]))), 10);
	dispatch(&db, cmd("SET", &["counter", "notanint"]));
	assert!(matches!(dispatch(&db, cmd("INCR", &["counter"])), Reply::Error(_)));
}

#[test]
fn scenario_3_hash_lifecycle() {
	let dir = tempdir().unwrap();
	let db = open(dir.path());
	dispatch(&db, cmd("HSET", &["h", "f1", "v1"]));
	dispatch(&db, cmd("HSET", &["h", "f2", "v2"]));
	assert_eq!(as_int(dispatch(&db, cmd("HLEN", &["h"]))), 2);
	assert_eq!(as_int(dispatch(&db, cmd("HDEL", &["h", "f1"]))), 1);
	assert_eq!(as_int(dispatch(&db, cmd("HLEN", &["h"]))), 1);
	let all = flat_strings(dispatch(&db, cmd("HGETALL", &["h"])));
	assert_eq!(all, vec!["f2".to_string(), "v2".to_string()]);
}

#[test]
fn scenario_4_list_push_trim() {
	let dir = tempdir().unwrap();
	let db = open(dir.path());
	assert_eq!(as_int(dispatch(&db, cmd("RPUSH", &["L", "a", "b", "c"]))), 3);
	assert_eq!(flat_strings(dispatch(&db, cmd("LRANGE", &["L", "0", "-1"]))), vec!["a", "b", "c"]);
	assert_eq!(as_int(dispatch(&db, cmd("LPUSH", &["L", "z"]))), 4);
	assert_eq!(flat_strings(dispatch(&db, cmd("LRANGE", &["L", "0", "-1"]))), vec!["z", "a", "b", "c"]);
	assert!(matches!(dispatch(&db, cmd("LTRIM", &["L", "1", "2"])), Reply::Simple(s) if s == "OK"));
	assert_eq!(flat_strings(dispatch(&db, cmd("LRANGE", &["L", "0", "-1"]))), vec!["a", "b"]);
}

#[test]
fn scenario_5_zset_ranges_and_incrby() {
	let dir = tempdir().unwrap();
	let db = open(dir.path());
	dispatch(&db, cmd("ZADD", &["z", "1", "a", "2", "b", "3", "c"]));
	assert_eq!(flat_strings(dispatch(&db, cmd("ZRANGE", &["z", "0", "-1"]))), vec!["a", "b", "c"]);
	assert_eq!(as_bulk(dispatch(&db, cmd("ZINCRBY", &["z", "10", "a"]))), b"11");
	assert_eq!(flat_strings(dispatch(&db, cmd("ZREVRANGE", &["z", "0", "-1"]))), vec!["a", "c", "b"]);
	assert_eq!(flat_strings(dispatch(&db, cmd("ZRANGEBYSCORE", &["z", "2", "3"]))), vec!["b", "c"]);
}

#[test]
fn wrong_arg_count_never_touches_the_engine() {
	let dir = tempdir().unwrap();
	let db = open(dir.path());
	assert!(matches!(dispatch(&db, cmd("SET", &["onlykey"])), Reply::Error(_)));
	assert!(matches!(dispatch(&db, cmd("GET", &["missing"])), Reply::Nil));
}

#[test]
fn supplemented_keys_type_expire_ttl() {
	let dir = tempdir().unwrap();
	let db = open(dir.path());
	dispatch(&db, cmd("SET", &["user:1", "a"]));
	dispatch(&db, cmd("SET", &["user:2", "b"]));

	let mut matched = flat_strings(dispatch(&db, cmd("KEYS", &["user:*"])));
	matched.sort();
	assert_eq!(matched, vec!["user:1".to_string(), "user:2".to_string()]);

	assert!(matches!(dispatch(&db, cmd("TYPE", &["user:1"])), Reply::Simple(s) if s == "string"));
	assert_eq!(as_int(dispatch(&db, cmd("EXISTS", &["user:1", "missing"]))), 1);

	assert_eq!(as_int(dispatch(&db, cmd("EXPIRE", &["user:1", "100"]))), 1);
	assert!(as_int(dispatch(&db, cmd("TTL", &["user:1"]))) > 0);
	assert_eq!(as_int(dispatch(&db, cmd("PERSIST", &["user:1"]))), 1);
	assert_eq!(as_int(dispatch(&db, cmd("TTL", &["user:1"]))), -1);
}
