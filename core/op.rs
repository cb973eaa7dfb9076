use alloc::vec::Vec;

use crate::{flags::Flags, opcode::OpCode, varnode::Varnode};

/// One p-code operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PcodeOp {
    pub opcode: OpCode,
    pub output: Option<Varnode>,
    /// Position maps to operator argument position.
    pub inputs: Vec<Varnode>,
    pub flags: Flags,
}

impl PcodeOp {
    /// The operation terminates a basic block.
    pub const BLOCK_END: u32 = 1;

    pub fn new(opcode: OpCode, output: Option<Varnode>, inputs: Vec<Varnode>) -> Self {
        Self {
            opcode,
            output,
            inputs,
            flags: Flags::empty(),
        }
    }

    pub fn is_block_end(&self) -> bool {
        self.flags.any(Self::BLOCK_END)
    }

    /// Control leaves the instruction, as opposed to a branch to another
    /// operation of the same instruction.
    pub fn leaves_instruction(&self) -> bool {
        match self.opcode {
            OpCode::Branch | OpCode::CBranch => {
                self.inputs.first().map_or(false, |dest| !dest.is_constant())
            }
            OpCode::BranchInd | OpCode::Return => true,
            _ => false,
        }
    }
}
