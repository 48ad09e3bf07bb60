// Per-connection loop. Each accepted connection gets its own OS thread,
// reading one RESP frame at a time and dispatching it synchronously.

use std::io::{BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fincas::Database;

use crate::dispatch::dispatch;
use crate::resp::{read_command, write_reply, Reply, RespError};

#[derive(Default)]
pub struct Stats {
	pub conn_count: AtomicI64,
	pub cmd_count: AtomicI64,
	pub error_count: AtomicI64,
}

pub fn handle_connection(db: Arc<Database>, stream: TcpStream, read_timeout: Duration, write_timeout: Duration, stats: Arc<Stats>) {
	let _ = stream.set_read_timeout(Some(read_timeout));
	let _ = stream.set_write_timeout(Some(write_timeout));
	let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_string());

	let reader_stream = match stream.try_clone() {
		Ok(s) => s,
		Err(e) => {
			log::warn!(target: "fincas", "failed to clone connection from {}: {}", peer, e);
			return;
		}
	};
	let mut reader = BufReader::new(reader_stream);
	let mut writer = BufWriter::new(stream);

	stats.conn_count.fetch_add(1, Ordering::SeqCst);
	log::debug!(target: "fincas", "connection opened: {}", peer);

	loop {
		let cmd = match read_command(&mut reader) {
			Ok(Some(cmd)) => cmd,
			Ok(None) => break,
			Err(RespError::Io(e)) if is_timeout(&e) => {
				log::debug!(target: "fincas", "connection {} idle timeout", peer);
				break;
			}
			Err(e) => {
				log::debug!(target: "fincas", "connection {} closed on protocol error: {}", peer, e);
				let _ = write_reply(&mut writer, &Reply::Error(format!("ERR {}", e)));
				let _ = writer.flush();
				break;
			}
		};

		let reply = dispatch(&db, cmd);
		if matches!(reply, Reply::Error(_)) {
			stats.error_count.fetch_add(1, Ordering::SeqCst);
		}
		stats.cmd_count.fetch_add(1, Ordering::SeqCst);

		if write_reply(&mut writer, &reply).is_err() || writer.flush().is_err() {
			break;
		}
	}

	stats.conn_count.fetch_sub(1, Ordering::SeqCst);
	log::debug!(target: "fincas", "connection closed: {}", peer);
}

fn is_timeout(e: &std::io::Error) -> bool {
	matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}
