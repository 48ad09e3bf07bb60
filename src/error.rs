// Error kinds for the storage engine and type-encoding layer.
//
// No `thiserror`/`anyhow` here by design: plain `Display` + `std::error::Error`
// impls, hand-rolled rather than pulling in a derive crate for it.

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	KeyNotFound,
	EmptyKey,
	KeyTooLarge(usize),
	ValueTooLarge(usize),
	NotAnInteger,
	NotAFloat,
	InvalidTtl,
	WrongArgCount,
	Syntax(String),
	ChecksumMismatch,
	InsufficientData,
	InvalidLength,
	FileNotFound(String),
	Write(String),
	Read(String),
	Closed,
	UnknownCommand(String),
	RedirectToLeader,
	Io(io::Error),
	Corruption(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::KeyNotFound => write!(f, "key not found"),
			Error::EmptyKey => write!(f, "key is empty"),
			Error::KeyTooLarge(n) => write!(f, "key too large ({} bytes)", n),
			Error::ValueTooLarge(n) => write!(f, "value too large ({} bytes)", n),
			Error::NotAnInteger => write!(f, "value is not an integer"),
			Error::NotAFloat => write!(f, "value is not a float"),
			Error::InvalidTtl => write!(f, "invalid TTL"),
			Error::WrongArgCount => write!(f, "wrong number of arguments"),
			Error::Syntax(s) => write!(f, "syntax error: {}", s),
			Error::ChecksumMismatch => write!(f, "checksum mismatch"),
			Error::InsufficientData => write!(f, "insufficient data"),
			Error::InvalidLength => write!(f, "invalid record length"),
			Error::FileNotFound(s) => write!(f, "file not found: {}", s),
			Error::Write(s) => write!(f, "write failed: {}", s),
			Error::Read(s) => write!(f, "read failed: {}", s),
			Error::Closed => write!(f, "database is closed"),
			Error::UnknownCommand(s) => write!(f, "unknown command '{}'", s),
			Error::RedirectToLeader => write!(f, "not the leader, redirect required"),
			Error::Io(e) => write!(f, "io error: {}", e),
			Error::Corruption(s) => write!(f, "corruption: {}", s),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Io(e)
	}
}
