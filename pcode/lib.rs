//! Specification-driven instruction decoder and p-code translator.
//!
//! A [`Context`] is created from a compiled language description (see
//! [`pcode_core::sla`]) and turns machine code into disassembly text or
//! p-code operations.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[macro_use]
extern crate log;

pub mod arch;

mod context;
mod decoder;
mod display;
mod emit;
mod expr;
mod language;
mod matcher;
mod registers;
mod spaces;
mod tree;

#[cfg(feature = "print")]
mod printer;

use alloc::{string::String, sync::Arc, vec, vec::Vec};
use core::{fmt, ops};

use crate::{decoder::DecodePass, emit::Emitter};

pub use pcode_core::{
    error::Error as DecodeError,
    sla::{LoadError, Sla},
    AddressSpace, OpCode, Options, PcodeOp, SpaceKind, Varnode,
};

pub use crate::{
    arch::Arch,
    context::ContextState,
    language::Language,
    registers::{RegisterInfo, RegisterTable},
    spaces::Spaces,
};

#[cfg(feature = "print")]
pub use crate::printer::{display_op, Printer, PrinterExt, Style};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The language description is malformed.
    Load(LoadError),
    UnknownLanguage(String),
    UnknownContextVariable(String),
    UnknownSpace,
    UnknownRegister(String),
}

impl From<LoadError> for Error {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Load(err) => write!(fmt, "failed to load language: {err}"),
            Self::UnknownLanguage(id) => write!(fmt, "unknown language {id}"),
            Self::UnknownContextVariable(name) => write!(fmt, "unknown context variable {name}"),
            Self::UnknownSpace => fmt.write_str("unknown address space"),
            Self::UnknownRegister(name) => write!(fmt, "unknown register {name}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Options of [`Context::translate`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TranslateFlags(u32);

impl TranslateFlags {
    /// Flag ops that end a basic block with [`PcodeOp::BLOCK_END`].
    pub const BB_TERMINATING: Self = Self(1);
    /// Stop after the first instruction that leaves its basic block.
    pub const STOP_AT_BLOCK_END: Self = Self(2);
    /// Emit an IMARK op before the ops of each instruction.
    pub const INSTRUCTION_MARKERS: Self = Self(4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 7)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for TranslateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for TranslateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisassemblyInstruction {
    pub address: u64,
    pub length: usize,
    pub mnemonic: String,
    pub body: String,
}

impl fmt::Display for DisassemblyInstruction {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.mnemonic)?;
        if !self.body.is_empty() {
            write!(fmt, " {}", self.body)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Disassembly {
    pub instructions: Vec<DisassemblyInstruction>,
    /// Why decoding stopped before the end of the buffer or the limit.
    ///
    /// Offsets and lengths are relative to the instruction that did not
    /// decode, which starts `len_bytes()` bytes into the buffer.
    pub error: Option<DecodeError>,
}

impl Disassembly {
    pub fn count(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Number of bytes covered by the decoded instructions.
    pub fn len_bytes(&self) -> usize {
        self.instructions.iter().map(|i| i.length).sum()
    }

    pub fn iter(&self) -> core::slice::Iter<DisassemblyInstruction> {
        self.instructions.iter()
    }
}

/// Ops of one translated instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatedInstruction {
    pub address: u64,
    pub length: usize,
    /// Range in [`Translation::ops`].
    pub ops: ops::Range<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Translation {
    pub ops: Vec<PcodeOp>,
    pub instructions: Vec<TranslatedInstruction>,
    /// Why decoding stopped before the end of the buffer or the limit,
    /// relative to the start of the instruction that did not decode.
    pub error: Option<DecodeError>,
}

impl Translation {
    pub fn count(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn instruction_ops(&self, insn: &TranslatedInstruction) -> &[PcodeOp] {
        self.ops.get(insn.ops.clone()).unwrap_or(&[])
    }
}

/// A decode and translate engine.
///
/// The loaded language is shared between engines created with
/// [`Context::fork`]. Context defaults belong to each engine.
#[derive(Clone, Debug)]
pub struct Context {
    lang: Arc<Language>,
    defaults: ContextState,
}

impl Context {
    /// Create an engine from a compiled language description.
    pub fn new(sla: &[u8]) -> Result<Self, Error> {
        Self::with_options(sla, Options::default())
    }

    pub fn with_options(sla: &[u8], opts: Options) -> Result<Self, Error> {
        let lang = Language::load(sla, opts)?;
        Ok(Self::from_language(Arc::new(lang)))
    }

    pub fn from_language(lang: Arc<Language>) -> Self {
        let defaults = lang.context_defaults().clone();
        Self { lang, defaults }
    }

    /// Create an engine for a built-in language with its context defaults.
    pub fn from_arch(arch: Arch) -> Result<Self, Error> {
        let mut ctx = Self::new(arch.sla())?;
        for &(name, value) in arch.context_defaults() {
            ctx.set_context_default(name, value)?;
        }
        Ok(ctx)
    }

    /// Create an engine for a built-in language by its id.
    pub fn from_id(id: &str) -> Result<Self, Error> {
        let arch = Arch::from_id(id).ok_or_else(|| Error::UnknownLanguage(id.into()))?;
        Self::from_arch(arch)
    }

    /// Another engine sharing the loaded language.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn language(&self) -> &Arc<Language> {
        &self.lang
    }

    /// Set the value a context variable has at the start of every decode.
    pub fn set_context_default(&mut self, name: &str, value: u32) -> Result<(), Error> {
        match self.lang.context_field(name) {
            Some(def) => {
                self.defaults.set(def, value);
                Ok(())
            }
            None => {
                warn!("{}: unknown context variable {name}", self.lang.name());
                Err(Error::UnknownContextVariable(name.into()))
            }
        }
    }

    pub fn context_default(&self, name: &str) -> Option<u32> {
        self.lang.context_field(name).map(|def| self.defaults.get(def))
    }

    /// Context visible to the next decode.
    pub fn snapshot(&self) -> ContextState {
        self.defaults.clone()
    }

    pub fn spaces(&self) -> &Spaces {
        self.lang.spaces()
    }

    pub fn space(&self, name: &str) -> Result<&Arc<AddressSpace>, Error> {
        self.lang.spaces().resolve(name)
    }

    pub fn space_by_index(&self, index: usize) -> Result<&Arc<AddressSpace>, Error> {
        self.lang.spaces().resolve_index(index)
    }

    /// The space holding constant `value`, every constant uses the same one.
    pub fn space_for_constant(&self, _value: u64) -> Arc<AddressSpace> {
        self.lang.spaces().constant().clone()
    }

    pub fn registers(&self) -> &[RegisterInfo] {
        self.lang.registers().all()
    }

    pub fn list_registers(&self) -> Vec<RegisterInfo> {
        self.registers().to_vec()
    }

    pub fn register(&self, name: &str) -> Result<&RegisterInfo, Error> {
        self.lang
            .registers()
            .by_name(name)
            .ok_or_else(|| Error::UnknownRegister(name.into()))
    }

    /// Name of the register covering exactly the given range.
    pub fn register_name(&self, space: &AddressSpace, offset: u64, size: i32) -> Option<&str> {
        let own = self.lang.spaces().get(space.index as usize)?;
        if own.name != space.name {
            return None;
        }
        self.lang.registers().name_of(space.index, offset, size)
    }

    /// Disassemble up to `max` instructions of `bytes` loaded at `base`.
    ///
    /// Decoding stops at the first byte sequence that does not decode, the
    /// instructions before it are returned.
    pub fn disassemble(&self, bytes: &[u8], base: u64, max: usize) -> Disassembly {
        let lang = &*self.lang;
        let mut instructions = Vec::new();
        let error = DecodePass::new(lang, &self.defaults).run(bytes, base, max, |_, insn| {
            let (mnemonic, body) = display::render(lang, &insn);
            instructions.push(DisassemblyInstruction {
                address: insn.address,
                length: insn.length,
                mnemonic,
                body,
            });
            true
        });
        Disassembly {
            instructions,
            error,
        }
    }

    /// Translate up to `max` instructions of `bytes` loaded at `base` to p-code.
    ///
    /// Temporaries are numbered from the unique base of the language on
    /// every call. They never alias within one translation, but two calls
    /// reuse the same unique offsets.
    pub fn translate(&self, bytes: &[u8], base: u64, max: usize, flags: TranslateFlags) -> Translation {
        let lang = &*self.lang;
        let mut emitter = Emitter::new(lang);
        let mut ops = Vec::new();
        let mut instructions = Vec::new();
        let error = DecodePass::new(lang, &self.defaults).run(bytes, base, max, |_, insn| {
            let first = ops.len();
            if flags.contains(TranslateFlags::INSTRUCTION_MARKERS) {
                let space = lang.spaces().default_space().clone();
                let vn = Varnode::new(space, insn.address, insn.length as i32);
                ops.push(PcodeOp::new(OpCode::Imark, None, vec![vn]));
            }
            emitter.emit(&insn, &mut ops);

            let mut leaves = false;
            for op in &mut ops[first..] {
                if op.leaves_instruction() {
                    leaves = true;
                    if flags.contains(TranslateFlags::BB_TERMINATING) {
                        op.flags.set(PcodeOp::BLOCK_END);
                    }
                }
            }
            instructions.push(TranslatedInstruction {
                address: insn.address,
                length: insn.length,
                ops: first..ops.len(),
            });
            !(leaves && flags.contains(TranslateFlags::STOP_AT_BLOCK_END))
        });
        Translation {
            ops,
            instructions,
            error,
        }
    }

    /// Listing printer writing addresses, bytes and instructions.
    #[cfg(feature = "print")]
    pub fn printer<E: PrinterExt>(&self, ext: E) -> Printer<E> {
        Printer::new(self, ext)
    }
}
