use alloc::{boxed::Box, string::String, vec::Vec};
use core::ops;

use crate::{opcode::OpCode, space::SpaceKind};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sla {
    pub name: String,
    pub big_endian: bool,
    pub alignment: u32,
    /// First offset handed out for temporaries in the unique space.
    pub unique_base: u64,
    pub default_space: u32,
    /// Table decoding whole instructions.
    pub root: u32,
    /// Number of 32-bit context words.
    pub context_words: u32,
    pub spaces: Vec<SpaceDef>,
    pub registers: Vec<RegisterDef>,
    pub tokens: Vec<TokenDef>,
    pub fields: Vec<FieldDef>,
    pub context_fields: Vec<ContextFieldDef>,
    pub user_ops: Vec<String>,
    pub tables: Vec<TableDef>,
}

impl Sla {
    pub fn space_index(&self, kind: SpaceKind) -> Option<u32> {
        self.spaces
            .iter()
            .position(|i| i.kind == kind)
            .map(|i| i as u32)
    }

    pub fn constructor(&self, table: u32, index: u32) -> Option<&ConstructorDef> {
        self.tables
            .get(table as usize)
            .and_then(|t| t.constructors.get(index as usize))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpaceDef {
    pub name: String,
    pub kind: SpaceKind,
    pub address_size: u32,
    pub word_size: u32,
    pub flags: u32,
    pub pointer_lower_bound: u64,
    pub pointer_upper_bound: u64,
    pub overlay_base: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterDef {
    pub name: String,
    pub space: u32,
    pub offset: u64,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenDef {
    pub name: String,
    /// Size in bytes, at most 8.
    pub size: u32,
    pub big_endian: bool,
}

/// Values attached to the raw value of a field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Attach {
    #[default]
    None,
    /// Register index per field value.
    Registers(Vec<Option<u32>>),
    /// Display name per field value.
    Names(Vec<Option<String>>),
    /// Integer per field value.
    Values(Vec<Option<i64>>),
}

impl Attach {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns `false` if the attachment has no entry for `value`.
    pub fn has_entry(&self, value: u64) -> bool {
        let index = value as usize;
        match self {
            Self::None => true,
            Self::Registers(v) => matches!(v.get(index), Some(Some(_))),
            Self::Names(v) => matches!(v.get(index), Some(Some(_))),
            Self::Values(v) => matches!(v.get(index), Some(Some(_))),
        }
    }
}

/// A bit range of a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub token: u32,
    pub lsb: u32,
    pub msb: u32,
    pub signed: bool,
    /// Display in hexadecimal instead of decimal.
    pub hex: bool,
    pub attach: Attach,
}

impl FieldDef {
    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }
}

/// A bit range of a context word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextFieldDef {
    pub name: String,
    pub word: u32,
    pub lsb: u32,
    pub msb: u32,
    pub signed: bool,
    pub hex: bool,
    pub default: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub constructors: Vec<ConstructorDef>,
}

/// Masked bits at consecutive positions starting at `offset`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block<W> {
    pub offset: u32,
    pub mask: Vec<W>,
    pub value: Vec<W>,
}

impl Block<u8> {
    pub fn end(&self) -> u32 {
        self.offset + self.mask.len() as u32
    }

    pub fn bits(&self) -> u32 {
        self.mask.iter().map(|i| i.count_ones()).sum()
    }
}

impl Block<u32> {
    pub fn bits(&self) -> u32 {
        self.mask.iter().map(|i| i.count_ones()).sum()
    }
}

/// Instruction bytes and context words a constructor requires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern {
    /// Byte constraints, offsets are relative to the constructor start.
    pub instruction: Block<u8>,
    /// Word constraints, offsets are context word indices.
    pub context: Block<u32>,
}

impl Pattern {
    /// Number of constrained bits.
    pub fn specificity(&self) -> u32 {
        self.instruction.bits() + self.context.bits()
    }
}

/// Where an operand starts.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OperandOffset {
    /// Start after the end of this operand instead of the constructor start.
    pub base: Option<u32>,
    pub rel: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// Token field read at the operand offset.
    Field(u32),
    Context(u32),
    /// Sub-table matched at the operand offset.
    Table(u32),
    /// Value computed from other operands.
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperandDef {
    pub name: String,
    pub offset: OperandOffset,
    pub kind: OperandKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Add,
            1 => Self::Sub,
            2 => Self::Mul,
            3 => Self::Div,
            4 => Self::And,
            5 => Self::Or,
            6 => Self::Xor,
            7 => Self::Shl,
            8 => Self::Shr,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn apply(self, a: i64, b: i64) -> i64 {
        match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Mul => a.wrapping_mul(b),
            Self::Div if b == 0 => 0,
            Self::Div => a.wrapping_div(b),
            Self::And => a & b,
            Self::Or => a | b,
            Self::Xor => a ^ b,
            Self::Shl => a.wrapping_shl(b as u32),
            Self::Shr => a.wrapping_shr(b as u32),
        }
    }
}

/// Decode-time value expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Const(i64),
    /// Token field read at the constructor start.
    Field(u32),
    Context(u32),
    /// Address of the current instruction.
    InstStart,
    /// Address of the following instruction.
    InstNext,
    /// Value of another operand of the same constructor.
    Operand(u32),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn binary(op: BinOp, a: Expr, b: Expr) -> Self {
        Self::Binary(op, Box::new(a), Box::new(b))
    }

    /// Visit this expression and every sub-expression.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Self::Not(e) | Self::Neg(e) => e.walk(f),
            Self::Binary(_, a, b) => {
                a.walk(f);
                b.walk(f);
            }
            _ => {}
        }
    }

    pub fn uses_inst_next(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= matches!(e, Expr::InstNext));
        found
    }
}

macro_rules! impl_expr_ops {
    ($($trait:ident, $method:ident, $op:ident;)*) => ($(
        impl ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary(BinOp::$op, self, rhs)
            }
        }
    )*);
}

impl_expr_ops! {
    Add, add, Add;
    Sub, sub, Sub;
    Mul, mul, Mul;
    Div, div, Div;
    BitAnd, bitand, And;
    BitOr, bitor, Or;
    BitXor, bitxor, Xor;
    Shl, shl, Shl;
    Shr, shr, Shr;
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

/// Write to a context field when the constructor matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextChange {
    pub field: u32,
    pub value: Expr,
    /// Also applies to the following instructions of a decode pass.
    pub commit: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayPiece {
    Text(String),
    Operand(u32),
}

/// Which part of an operand's varnode a template constant refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandPart {
    Offset,
    Size,
    /// Index of the operand's space.
    Space,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstTpl {
    Real(u64),
    InstStart,
    InstNext,
    /// Distance in operations to a label of the same constructor.
    Label(u32),
    /// Index of an address space.
    SpaceId(u32),
    Operand { index: u32, part: OperandPart },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpaceTpl {
    Space(u32),
    Operand(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarnodeTpl {
    pub space: SpaceTpl,
    pub offset: ConstTpl,
    pub size: ConstTpl,
}

impl VarnodeTpl {
    /// The whole varnode of operand `index`.
    pub fn operand(index: u32) -> Self {
        Self {
            space: SpaceTpl::Operand(index),
            offset: ConstTpl::Operand {
                index,
                part: OperandPart::Offset,
            },
            size: ConstTpl::Operand {
                index,
                part: OperandPart::Size,
            },
        }
    }

    /// Operands referenced anywhere in the template.
    pub fn operands(&self) -> impl Iterator<Item = u32> + '_ {
        let space = match self.space {
            SpaceTpl::Operand(k) => Some(k),
            _ => None,
        };
        let part = |c: &ConstTpl| match c {
            ConstTpl::Operand { index, .. } => Some(*index),
            _ => None,
        };
        space
            .into_iter()
            .chain(part(&self.offset))
            .chain(part(&self.size))
    }

    /// Whether the whole operand handle is used as the varnode.
    pub fn is_operand_handle(&self) -> Option<u32> {
        match (&self.space, &self.offset) {
            (
                SpaceTpl::Operand(k),
                ConstTpl::Operand {
                    index,
                    part: OperandPart::Offset,
                },
            ) if k == index => Some(*k),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpTpl {
    pub opcode: OpCode,
    pub output: Option<VarnodeTpl>,
    pub inputs: Vec<VarnodeTpl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    Op(OpTpl),
    /// Emit the semantics of a sub-table operand here.
    Build(u32),
    /// Position of a label.
    Label(u32),
}

/// Value a sub-table hands to the constructor using it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Export {
    Varnode(VarnodeTpl),
    /// `*[space]:size pointer`, read with LOAD and written with STORE.
    Pointer {
        space: u32,
        pointer: VarnodeTpl,
        size: u32,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstructorDef {
    pub pattern: Pattern,
    /// Bytes covered by the constructor's own tokens.
    pub length: u32,
    pub operands: Vec<OperandDef>,
    pub context_changes: Vec<ContextChange>,
    pub mnemonic: Vec<DisplayPiece>,
    pub body: Vec<DisplayPiece>,
    pub semantics: Vec<Stmt>,
    pub export: Option<Export>,
}

impl ConstructorDef {
    /// A constructor whose display is entirely delegated to one sub-table.
    pub fn delegate(&self) -> Option<u32> {
        match self.mnemonic.as_slice() {
            [DisplayPiece::Operand(k)] if self.body.is_empty() => {
                match self.operands.get(*k as usize)?.kind {
                    OperandKind::Table(_) => Some(*k),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_ops() {
        let e = Expr::InstStart + Expr::Field(0) * Expr::Const(2);
        assert!(!e.uses_inst_next());
        assert!((Expr::InstNext - Expr::Const(1)).uses_inst_next());
        assert_eq!(BinOp::Shl.apply(1, 4), 16);
        assert_eq!(BinOp::Div.apply(1, 0), 0);
    }

    #[test]
    fn specificity() {
        let pattern = Pattern {
            instruction: Block {
                offset: 0,
                mask: vec![0xf0, 0x01],
                value: vec![0x10, 0x01],
            },
            context: Block {
                offset: 0,
                mask: vec![0x3],
                value: vec![0x1],
            },
        };
        assert_eq!(pattern.specificity(), 7);
        assert_eq!(pattern.instruction.end(), 2);
    }
}
