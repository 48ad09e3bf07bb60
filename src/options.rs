// Construction-time configuration for the engine and its collaborators.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemIndexKind {
	BTree,
	SkipList,
	HashTable,
}

impl Default for MemIndexKind {
	fn default() -> Self {
		MemIndexKind::HashTable
	}
}

#[derive(Debug, Clone)]
pub struct Options {
	pub data_dir: PathBuf,

	pub mem_index_kind: MemIndexKind,
	pub mem_index_shard_count: usize,
	pub btree_degree: usize,

	pub open_mem_cache: bool,
	pub mem_cache_size: usize,

	pub max_file_size: u64,
	pub max_open_files: usize,
	pub sync_interval: Duration,

	pub auto_merge: bool,
	pub merge_interval: Duration,
	pub min_merge_ratio: f64,

	pub bloom_expected_keys: u64,
	pub bloom_false_positive_rate: f64,
}

impl Default for Options {
	fn default() -> Options {
		Options {
			data_dir: PathBuf::from("/tmp/fincas"),
			mem_index_kind: MemIndexKind::HashTable,
			mem_index_shard_count: 1 << 8,
			btree_degree: 8,
			open_mem_cache: true,
			mem_cache_size: 1 << 10,
			max_file_size: 1 << 30,
			max_open_files: 10,
			sync_interval: Duration::from_secs(5),
			auto_merge: true,
			merge_interval: Duration::from_secs(3600),
			min_merge_ratio: 0.3,
			bloom_expected_keys: 1 << 20,
			bloom_false_positive_rate: 0.01,
		}
	}
}

/// Options governing the TTL coordinator and write-batch layer, kept
/// distinct from the engine's own `Options` so callers can reconfigure
/// expiry/batch behavior without touching storage layout settings.
#[derive(Debug, Clone)]
pub struct DbOptions {
	pub ttl_metadata_file: String,
	pub flush_ttl_on_change: bool,
	pub expire_check_interval: Duration,
}

impl Default for DbOptions {
	fn default() -> DbOptions {
		DbOptions {
			ttl_metadata_file: "ttl.data".to_string(),
			flush_ttl_on_change: false,
			expire_check_interval: Duration::from_secs(1),
		}
	}
}
