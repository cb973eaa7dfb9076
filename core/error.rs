use core::fmt;

/// Reasons a single instruction could not be decoded.
///
/// Both variants end a decode pass early; neither is fatal to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Need more bytes to decode an instruction, the value is the number
    /// of bytes required from the start of the instruction.
    More(usize),
    /// No encoding matches, the value is the offset of the failing
    /// sub-match from the start of the instruction.
    Failed(usize),
}

impl Error {
    pub fn is_more(&self) -> bool {
        matches!(self, Self::More(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::More(len) => write!(fmt, "need more data, {len} bytes required"),
            Self::Failed(offset) => write!(fmt, "no matching encoding at offset {offset}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
