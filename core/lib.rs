#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod bytes;
pub mod error;
pub mod flags;
pub mod macros;
pub mod op;
pub mod opcode;
pub mod sla;
pub mod space;
pub mod utils;
pub mod varnode;

#[cfg(feature = "print")]
pub mod printer;

pub use crate::{
    error::Error,
    op::PcodeOp,
    opcode::OpCode,
    space::{AddressSpace, SpaceKind},
    varnode::Varnode,
};

/// Engine limits applied while loading a language and decoding instructions.
#[derive(Copy, Clone, Debug)]
pub struct Options {
    /// Maximum nesting of sub-table matches per instruction.
    pub max_depth: usize,
    /// Longest instruction the matcher will accept, in bytes.
    pub max_insn_len: usize,
    /// Build per-table decision trees at load time.
    pub decision_trees: bool,
    /// Constructors the matcher may try per instruction.
    pub max_steps: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_insn_len: 32,
            decision_trees: true,
            max_steps: 4096,
        }
    }
}
