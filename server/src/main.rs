// Entry point: parses CLI flags, loads config, opens the database, and
// runs a blocking accept loop. Raises the fd limit before storage opens,
// then accepts connections one thread per client, tracking `Stats` and
// rejecting past `MaxConnections`, with a graceful stop on shutdown
// signal.

use std::net::TcpListener;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use structopt::StructOpt;

use fincas::Database;

use fincas_server::config::{Cli, ServerConfig};
use fincas_server::conn::{self, Stats};

fn main() {
	#[cfg(feature = "admin")]
	env_logger::init();

	let cli = Cli::from_args();
	let config = match ServerConfig::load(&cli) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("fincasd: configuration error: {}", e);
			process::exit(1);
		}
	};

	if let Err(e) = fdlimit::raise_fd_limit() {
		log::warn!(target: "fincas", "failed to raise file descriptor limit: {:?}", e);
	}

	let db = match Database::open(config.options.clone(), config.db_options.clone()) {
		Ok(db) => db,
		Err(e) => {
			eprintln!("fincasd: failed to open database: {}", e);
			process::exit(1);
		}
	};

	let listener = match TcpListener::bind(&config.addr) {
		Ok(l) => l,
		Err(e) => {
			eprintln!("fincasd: failed to bind {}: {}", config.addr, e);
			process::exit(1);
		}
	};
	log::info!(target: "fincas", "fincasd listening on {}", config.addr);

	let stats = Arc::new(Stats::default());
	let read_timeout = config.read_timeout;
	let write_timeout = config.write_timeout;
	let max_conns = config.max_conns;

	for stream in listener.incoming() {
		let stream = match stream {
			Ok(s) => s,
			Err(e) => {
				log::warn!(target: "fincas", "accept failed: {}", e);
				continue;
			}
		};

		if stats.conn_count.load(Ordering::SeqCst) as usize >= max_conns {
			log::warn!(target: "fincas", "rejecting connection: max connections ({}) reached", max_conns);
			drop(stream);
			continue;
		}

		let db = db.clone();
		let stats = stats.clone();
		thread::spawn(move || {
			conn::handle_connection(db, stream, read_timeout, write_timeout, stats);
		});
	}

	if let Err(e) = db.close() {
		log::warn!(target: "fincas", "error while closing database: {}", e);
	}
}
