//! Compiled language description ("SLA blob").
//!
//! A [`Sla`] is the in-memory model of a processor specification. It is
//! serialised with [`Sla::to_bytes`] and loaded with [`Sla::from_bytes`],
//! which also validates it.

mod codec;
mod model;
mod validate;

use alloc::string::String;
use core::fmt;

pub use self::model::*;

/// The format version written by [`Sla::to_bytes`].
pub const VERSION: u16 = 1;

/// Magic bytes at the start of every blob.
pub const MAGIC: [u8; 4] = *b"PSLA";

/// Errors raised while loading a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The blob ended early, the value is the offset of the short read.
    Truncated(usize),
    BadMagic,
    Version(u16),
    /// A string is not valid UTF-8.
    Utf8(usize),
    /// Unknown tag byte at the given offset.
    Tag(usize, u8),
    /// Expression nesting is too deep at the given offset.
    TooDeep(usize),
    /// Bytes left over after the last table.
    Trailing(usize),
    /// The blob decoded but describes an inconsistent language.
    Invalid(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Truncated(offset) => write!(fmt, "unexpected end of data at offset {offset}"),
            Self::BadMagic => fmt.write_str("not a compiled language description"),
            Self::Version(version) => write!(fmt, "unsupported format version {version}"),
            Self::Utf8(offset) => write!(fmt, "invalid UTF-8 string at offset {offset}"),
            Self::Tag(offset, tag) => write!(fmt, "unknown tag {tag:#x} at offset {offset}"),
            Self::TooDeep(offset) => write!(fmt, "expression nested too deeply at offset {offset}"),
            Self::Trailing(offset) => write!(fmt, "trailing data at offset {offset}"),
            Self::Invalid(msg) => write!(fmt, "invalid language: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoadError {}

impl Sla {
    /// Decode and validate a blob.
    pub fn from_bytes(data: &[u8]) -> Result<Self, LoadError> {
        let sla = codec::decode(data)?;
        sla.validate()?;
        Ok(sla)
    }

    pub fn to_bytes(&self) -> alloc::vec::Vec<u8> {
        codec::encode(self)
    }

    /// Check internal consistency: indices, operator arity and widths,
    /// label and build usage.
    pub fn validate(&self) -> Result<(), LoadError> {
        validate::validate(self).map_err(LoadError::Invalid)
    }
}
