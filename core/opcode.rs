use crate::macros::define_opcodes;

define_opcodes! {
    /// P-code operators.
    pub enum OpCode {
        /// Instruction marker, inputs describe the instruction.
        Imark = 0 => "IMARK",
        Copy = 1 => "COPY",
        Load = 2 => "LOAD",
        Store = 3 => "STORE",
        Branch = 4 => "BRANCH",
        CBranch = 5 => "CBRANCH",
        BranchInd = 6 => "BRANCHIND",
        Call = 7 => "CALL",
        CallInd = 8 => "CALLIND",
        CallOther = 9 => "CALLOTHER",
        Return = 10 => "RETURN",
        IntEqual = 11 => "INT_EQUAL",
        IntNotEqual = 12 => "INT_NOTEQUAL",
        IntSLess = 13 => "INT_SLESS",
        IntSLessEqual = 14 => "INT_SLESSEQUAL",
        IntLess = 15 => "INT_LESS",
        IntLessEqual = 16 => "INT_LESSEQUAL",
        IntZext = 17 => "INT_ZEXT",
        IntSext = 18 => "INT_SEXT",
        IntAdd = 19 => "INT_ADD",
        IntSub = 20 => "INT_SUB",
        IntCarry = 21 => "INT_CARRY",
        IntSCarry = 22 => "INT_SCARRY",
        IntSBorrow = 23 => "INT_SBORROW",
        Int2Comp = 24 => "INT_2COMP",
        IntNegate = 25 => "INT_NEGATE",
        IntXor = 26 => "INT_XOR",
        IntAnd = 27 => "INT_AND",
        IntOr = 28 => "INT_OR",
        IntLeft = 29 => "INT_LEFT",
        IntRight = 30 => "INT_RIGHT",
        IntSRight = 31 => "INT_SRIGHT",
        IntMult = 32 => "INT_MULT",
        IntDiv = 33 => "INT_DIV",
        IntSDiv = 34 => "INT_SDIV",
        IntRem = 35 => "INT_REM",
        IntSRem = 36 => "INT_SREM",
        BoolNegate = 37 => "BOOL_NEGATE",
        BoolXor = 38 => "BOOL_XOR",
        BoolAnd = 39 => "BOOL_AND",
        BoolOr = 40 => "BOOL_OR",
        FloatEqual = 41 => "FLOAT_EQUAL",
        FloatNotEqual = 42 => "FLOAT_NOTEQUAL",
        FloatLess = 43 => "FLOAT_LESS",
        FloatLessEqual = 44 => "FLOAT_LESSEQUAL",
        // 45 is unused
        FloatNan = 46 => "FLOAT_NAN",
        FloatAdd = 47 => "FLOAT_ADD",
        FloatDiv = 48 => "FLOAT_DIV",
        FloatMult = 49 => "FLOAT_MULT",
        FloatSub = 50 => "FLOAT_SUB",
        FloatNeg = 51 => "FLOAT_NEG",
        FloatAbs = 52 => "FLOAT_ABS",
        FloatSqrt = 53 => "FLOAT_SQRT",
        FloatInt2Float = 54 => "FLOAT_INT2FLOAT",
        FloatFloat2Float = 55 => "FLOAT_FLOAT2FLOAT",
        FloatTrunc = 56 => "FLOAT_TRUNC",
        FloatCeil = 57 => "FLOAT_CEIL",
        FloatFloor = 58 => "FLOAT_FLOOR",
        FloatRound = 59 => "FLOAT_ROUND",
        MultiEqual = 60 => "MULTIEQUAL",
        Indirect = 61 => "INDIRECT",
        Piece = 62 => "PIECE",
        SubPiece = 63 => "SUBPIECE",
        Cast = 64 => "CAST",
        PtrAdd = 65 => "PTRADD",
        PtrSub = 66 => "PTRSUB",
        SegmentOp = 67 => "SEGMENTOP",
        CPoolRef = 68 => "CPOOLREF",
        New = 69 => "NEW",
        Insert = 70 => "INSERT",
        Extract = 71 => "EXTRACT",
        PopCount = 72 => "POPCOUNT",
        LzCount = 73 => "LZCOUNT",
    }
}

/// Whether an operator writes an output varnode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Output {
    None,
    Optional,
    Required,
}

/// Input count and output rules of an operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` for variadic operators.
    pub max: Option<usize>,
    pub output: Output,
}

impl Arity {
    const fn new(min: usize, max: Option<usize>, output: Output) -> Self {
        Self { min, max, output }
    }

    const fn unary() -> Self {
        Self::new(1, Some(1), Output::Required)
    }

    const fn binary() -> Self {
        Self::new(2, Some(2), Output::Required)
    }

    pub fn accepts(&self, inputs: usize) -> bool {
        inputs >= self.min && self.max.map_or(true, |max| inputs <= max)
    }
}

impl OpCode {
    pub fn arity(&self) -> Arity {
        use Output as O;

        match self {
            Self::Imark => Arity::new(1, None, O::None),
            Self::Copy => Arity::unary(),
            Self::Load => Arity::binary(),
            Self::Store => Arity::new(3, Some(3), O::None),
            Self::Branch | Self::BranchInd => Arity::new(1, Some(1), O::None),
            Self::CBranch => Arity::new(2, Some(2), O::None),
            Self::Call | Self::CallInd | Self::Return => Arity::new(1, None, O::None),
            Self::CallOther => Arity::new(1, None, O::Optional),
            Self::IntZext
            | Self::IntSext
            | Self::Int2Comp
            | Self::IntNegate
            | Self::BoolNegate
            | Self::FloatNan
            | Self::FloatNeg
            | Self::FloatAbs
            | Self::FloatSqrt
            | Self::FloatInt2Float
            | Self::FloatFloat2Float
            | Self::FloatTrunc
            | Self::FloatCeil
            | Self::FloatFloor
            | Self::FloatRound
            | Self::Cast
            | Self::PopCount
            | Self::LzCount => Arity::unary(),
            Self::MultiEqual => Arity::new(2, None, O::Required),
            Self::PtrAdd | Self::SegmentOp | Self::Extract => Arity::new(3, Some(3), O::Required),
            Self::Insert => Arity::new(4, Some(4), O::Required),
            Self::CPoolRef => Arity::new(2, None, O::Required),
            Self::New => Arity::new(1, None, O::Required),
            _ => Arity::binary(),
        }
    }

    /// Operators producing a one byte boolean.
    pub fn is_boolean_output(&self) -> bool {
        matches!(
            self,
            Self::IntEqual
                | Self::IntNotEqual
                | Self::IntSLess
                | Self::IntSLessEqual
                | Self::IntLess
                | Self::IntLessEqual
                | Self::IntCarry
                | Self::IntSCarry
                | Self::IntSBorrow
                | Self::BoolNegate
                | Self::BoolXor
                | Self::BoolAnd
                | Self::BoolOr
                | Self::FloatEqual
                | Self::FloatNotEqual
                | Self::FloatLess
                | Self::FloatLessEqual
                | Self::FloatNan
        )
    }

    /// Operators whose inputs and output all share one size.
    pub fn is_same_size(&self) -> bool {
        matches!(
            self,
            Self::Copy
                | Self::IntAdd
                | Self::IntSub
                | Self::Int2Comp
                | Self::IntNegate
                | Self::IntXor
                | Self::IntAnd
                | Self::IntOr
                | Self::IntMult
                | Self::IntDiv
                | Self::IntSDiv
                | Self::IntRem
                | Self::IntSRem
        )
    }

    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Self::Branch | Self::CBranch | Self::BranchInd | Self::Call | Self::CallInd | Self::Return
        )
    }

    /// Operators that end a basic block when they leave the instruction.
    pub fn is_block_terminator(&self) -> bool {
        matches!(
            self,
            Self::Branch | Self::CBranch | Self::BranchInd | Self::Return
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering() {
        assert_eq!(OpCode::Imark as u32, 0);
        assert_eq!(OpCode::FloatNan as u32, 46);
        assert_eq!(OpCode::LzCount as u32, 73);
        assert_eq!(OpCode::from_u32(45), None);
        assert_eq!(OpCode::from_u32(19), Some(OpCode::IntAdd));
        assert_eq!(OpCode::ALL.len(), 73);
    }

    #[test]
    fn names() {
        for &op in OpCode::ALL {
            assert_eq!(OpCode::from_name(op.name()), Some(op));
        }
        assert_eq!(OpCode::IntSLessEqual.name(), "INT_SLESSEQUAL");
    }

    #[test]
    fn arity() {
        assert!(OpCode::Store.arity().accepts(3));
        assert!(!OpCode::Store.arity().accepts(2));
        assert!(OpCode::CallOther.arity().accepts(4));
        assert_eq!(OpCode::IntAdd.arity().output, Output::Required);
        assert_eq!(OpCode::Branch.arity().output, Output::None);
        assert!(!OpCode::Copy.arity().accepts(0));
    }
}
