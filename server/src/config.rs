// Server configuration: TOML file plus CLI overrides, read once at
// startup and passed down explicitly rather than through a process-wide
// singleton.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use structopt::StructOpt;

use fincas::options::{DbOptions, MemIndexKind, Options};

#[derive(StructOpt, Debug)]
#[structopt(name = "fincasd", about = "Embedded key-value store with a Redis-compatible front-end")]
pub struct Cli {
	/// Path to a TOML configuration file.
	#[structopt(long = "conf", parse(from_os_str))]
	pub conf: Option<PathBuf>,

	/// TCP port to listen on, overriding the config file.
	#[structopt(long = "port")]
	pub port: Option<u16>,

	/// Data directory, overriding the config file.
	#[structopt(long = "dir", parse(from_os_str))]
	pub dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct FileConfig {
	pub base: BaseSection,
	pub mem_index: MemIndexSection,
	pub mem_cache: MemCacheSection,
	pub file_manager: FileManagerSection,
	pub merge: MergeSection,
	pub network: NetworkSection,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct BaseSection {
	pub data_dir: String,
}

impl Default for BaseSection {
	fn default() -> BaseSection {
		BaseSection { data_dir: "./data".to_string() }
	}
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct MemIndexSection {
	pub data_structure: String,
	pub shard_count: usize,
	pub btree_degree: usize,
	pub hashtable_initial_size: usize,
}

impl Default for MemIndexSection {
	fn default() -> MemIndexSection {
		MemIndexSection { data_structure: "hashtable".to_string(), shard_count: 256, btree_degree: 8, hashtable_initial_size: 1024 }
	}
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct MemCacheSection {
	pub enable: bool,
	pub data_structure: String,
	pub size: usize,
}

impl Default for MemCacheSection {
	fn default() -> MemCacheSection {
		MemCacheSection { enable: true, data_structure: "lru".to_string(), size: 1024 }
	}
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct FileManagerSection {
	pub max_size: u64,
	pub max_opened: usize,
	pub sync_interval: u64,
}

impl Default for FileManagerSection {
	fn default() -> FileManagerSection {
		FileManagerSection { max_size: 1 << 30, max_opened: 10, sync_interval: 5 }
	}
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct MergeSection {
	pub auto: bool,
	pub interval: u64,
	pub min_ratio: f64,
}

impl Default for MergeSection {
	fn default() -> MergeSection {
		MergeSection { auto: true, interval: 3600, min_ratio: 0.3 }
	}
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct NetworkSection {
	pub addr: String,
	pub idle_timeout: u64,
	pub max_conns: usize,
	pub read_timeout: u64,
	pub write_timeout: u64,
}

impl Default for NetworkSection {
	fn default() -> NetworkSection {
		NetworkSection { addr: "127.0.0.1:8911".to_string(), idle_timeout: 5, max_conns: 1000, read_timeout: 10, write_timeout: 10 }
	}
}

/// Loaded config, CLI-overridden, translated into the types the storage
/// and network layers actually accept.
pub struct ServerConfig {
	pub options: Options,
	pub db_options: DbOptions,
	pub addr: String,
	pub idle_timeout: Duration,
	pub max_conns: usize,
	pub read_timeout: Duration,
	pub write_timeout: Duration,
}

impl ServerConfig {
	pub fn load(cli: &Cli) -> Result<ServerConfig, String> {
		let file_config = match &cli.conf {
			Some(path) => {
				let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {}", path.display(), e))?;
				toml::from_str(&text).map_err(|e| format!("parsing {}: {}", path.display(), e))?
			}
			None => FileConfig::default(),
		};

		let mem_index_kind = match file_config.mem_index.data_structure.as_str() {
			"btree" => MemIndexKind::BTree,
			"skiplist" => MemIndexKind::SkipList,
			_ => MemIndexKind::HashTable,
		};

		let mut options = Options {
			data_dir: PathBuf::from(&file_config.base.data_dir),
			mem_index_kind,
			mem_index_shard_count: file_config.mem_index.shard_count,
			btree_degree: file_config.mem_index.btree_degree,
			open_mem_cache: file_config.mem_cache.enable,
			mem_cache_size: file_config.mem_cache.size,
			max_file_size: file_config.file_manager.max_size,
			max_open_files: file_config.file_manager.max_opened,
			sync_interval: Duration::from_secs(file_config.file_manager.sync_interval),
			auto_merge: file_config.merge.auto,
			merge_interval: Duration::from_secs(file_config.merge.interval),
			min_merge_ratio: file_config.merge.min_ratio,
			..Options::default()
		};

		if let Some(dir) = &cli.dir {
			options.data_dir = dir.clone();
		}

		let mut addr = file_config.network.addr.clone();
		if let Some(port) = cli.port {
			addr = replace_port(&addr, port);
		}

		Ok(ServerConfig {
			options,
			db_options: DbOptions::default(),
			addr,
			idle_timeout: Duration::from_secs(file_config.network.idle_timeout),
			max_conns: file_config.network.max_conns,
			read_timeout: Duration::from_secs(file_config.network.read_timeout),
			write_timeout: Duration::from_secs(file_config.network.write_timeout),
		})
	}
}

fn replace_port(addr: &str, port: u16) -> String {
	match addr.rsplit_once(':') {
		Some((host, _)) => format!("{}:{}", host, port),
		None => format!("{}:{}", addr, port),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_loads_without_a_file() {
		let cli = Cli { conf: None, port: None, dir: None };
		let cfg = ServerConfig::load(&cli).unwrap();
		assert_eq!(cfg.addr, "127.0.0.1:8911");
	}

	#[test]
	fn cli_flags_override_defaults() {
		let cli = Cli { conf: None, port: Some(7000), dir: Some(PathBuf::from("/tmp/custom")) };
		let cfg = ServerConfig::load(&cli).unwrap();
		assert_eq!(cfg.addr, "127.0.0.1:7000");
		assert_eq!(cfg.options.data_dir, PathBuf::from("/tmp/custom"));
	}

	#[test]
	fn replace_port_swaps_trailing_segment() {
		assert_eq!(replace_port("127.0.0.1:8911", 9000), "127.0.0.1:9000");
		assert_eq!(replace_port("0.0.0.0", 9000), "0.0.0.0:9000");
	}
}
