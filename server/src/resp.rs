// RESP parser/writer: a request frame is always an array of bulk
// strings, replies are one of simple/error/integer/bulk/array.
// `Reply::Array` is recursive so a dispatch result like
// `HGETALL`/`ZRANGE WITHSCORES` can nest without a second reply type.

use std::io::{self, BufRead, Read, Write};

#[derive(Debug)]
pub enum RespError {
	Io(io::Error),
	Protocol(&'static str),
}

impl From<io::Error> for RespError {
	fn from(e: io::Error) -> RespError {
		RespError::Io(e)
	}
}

impl std::fmt::Display for RespError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			RespError::Io(e) => write!(f, "{}", e),
			RespError::Protocol(msg) => write!(f, "protocol error: {}", msg),
		}
	}
}

pub type RespResult<T> = Result<T, RespError>;

/// A decoded request: command name (uppercased) plus its raw argument
/// bytes, mirroring `protocol.Command`.
pub struct Command {
	pub name: String,
	pub args: Vec<Vec<u8>>,
}

/// Reads one `*N\r\n$len\r\n<bytes>\r\n...` frame from `reader`. Returns
/// `Ok(None)` on a clean EOF between frames (the connection closed between
/// commands, not mid-frame).
pub fn read_command<R: BufRead>(reader: &mut R) -> RespResult<Option<Command>> {
	let mut type_byte = [0u8; 1];
	match reader.read(&mut type_byte)? {
		0 => return Ok(None),
		_ => {}
	}
	if type_byte[0] != b'*' {
		return Err(RespError::Protocol("expected array frame"));
	}

	let length = read_line_int(reader)?;
	if length < 1 {
		return Err(RespError::Protocol("empty command array"));
	}

	let mut args = Vec::with_capacity(length as usize);
	for _ in 0..length {
		let mut marker = [0u8; 1];
		reader.read_exact(&mut marker)?;
		if marker[0] != b'$' {
			return Err(RespError::Protocol("expected bulk string"));
		}
		let bulk_len = read_line_int(reader)?;
		if bulk_len < 0 {
			return Err(RespError::Protocol("negative bulk length"));
		}
		let mut bulk = vec![0u8; bulk_len as usize];
		reader.read_exact(&mut bulk)?;
		let mut crlf = [0u8; 2];
		reader.read_exact(&mut crlf)?;
		if &crlf != b"\r\n" {
			return Err(RespError::Protocol("missing trailing CRLF"));
		}
		args.push(bulk);
	}

	let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
	Ok(Some(Command { name, args: args.split_off(1) }))
}

fn read_line_int<R: BufRead>(reader: &mut R) -> RespResult<i64> {
	let mut line = String::new();
	if reader.read_line(&mut line)? == 0 {
		return Err(RespError::Protocol("unexpected eof"));
	}
	let trimmed = line.trim_end_matches(['\r', '\n']);
	trimmed.parse::<i64>().map_err(|_| RespError::Protocol("invalid integer frame"))
}

/// A dispatch result, shaped for RESP encoding. `Nil` renders as `$-1\r\n`
/// (Go's `WriteBulk(nil)`); `NilArray` as `*-1\r\n`.
pub enum Reply {
	Simple(String),
	Error(String),
	Integer(i64),
	Bulk(Vec<u8>),
	Nil,
	Array(Vec<Reply>),
	NilArray,
}

impl Reply {
	pub fn ok() -> Reply {
		Reply::Simple("OK".to_string())
	}

	pub fn bulk(s: impl Into<Vec<u8>>) -> Reply {
		Reply::Bulk(s.into())
	}

	pub fn from_strings(items: Vec<String>) -> Reply {
		Reply::Array(items.into_iter().map(Reply::bulk).collect())
	}
}

pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> io::Result<()> {
	match reply {
		Reply::Simple(s) => {
			write!(writer, "+{}\r\n", s)
		}
		Reply::Error(msg) => {
			write!(writer, "-{}\r\n", msg.replace(['\r', '\n'], " "))
		}
		Reply::Integer(n) => {
			write!(writer, ":{}\r\n", n)
		}
		Reply::Bulk(bytes) => {
			write!(writer, "${}\r\n", bytes.len())?;
			writer.write_all(bytes)?;
			writer.write_all(b"\r\n")
		}
		Reply::Nil => writer.write_all(b"$-1\r\n"),
		Reply::NilArray => writer.write_all(b"*-1\r\n"),
		Reply::Array(items) => {
			write!(writer, "*{}\r\n", items.len())?;
			for item in items {
				write_reply(writer, item)?;
			}
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn read_command_parses_array_of_bulk_strings() {
		let frame = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
		let mut cursor = Cursor::new(&frame[..]);
		let cmd = read_command(&mut cursor).unwrap().unwrap();
		assert_eq!(cmd.name, "SET");
		assert_eq!(cmd.args, vec![b"foo".to_vec(), b"bar".to_vec()]);
	}

	#[test]
	fn read_command_returns_none_on_clean_eof() {
		let mut cursor = Cursor::new(&b""[..]);
		assert!(read_command(&mut cursor).unwrap().is_none());
	}

	#[test]
	fn read_command_rejects_non_array_frame() {
		let mut cursor = Cursor::new(&b"+OK\r\n"[..]);
		assert!(read_command(&mut cursor).is_err());
	}

	#[test]
	fn write_reply_encodes_each_variant() {
		let mut out = Vec::new();
		write_reply(&mut out, &Reply::ok()).unwrap();
		write_reply(&mut out, &Reply::Integer(42)).unwrap();
		write_reply(&mut out, &Reply::bulk(b"hi".to_vec())).unwrap();
		write_reply(&mut out, &Reply::Nil).unwrap();
		write_reply(&mut out, &Reply::Error("bad".to_string())).unwrap();
		assert_eq!(out, b"+OK\r\n:42\r\n$2\r\nhi\r\n$-1\r\n-bad\r\n".to_vec());
	}

	#[test]
	fn write_reply_encodes_nested_array() {
		let reply = Reply::Array(vec![Reply::bulk(b"a".to_vec()), Reply::Integer(1)]);
		let mut out = Vec::new();
		write_reply(&mut out, &reply).unwrap();
		assert_eq!(out, b"*2\r\n$1\r\na\r\n:1\r\n".to_vec());
	}
}
