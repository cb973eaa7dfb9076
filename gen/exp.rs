use std::ops;

use pcode_core::sla::BinOp;

/// Decode-time expression referring to fields, context variables and
/// operands by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exp {
    Int(i64),
    Field(String),
    Context(String),
    InstStart,
    InstNext,
    Operand(String),
    Not(Box<Exp>),
    Neg(Box<Exp>),
    Binary(BinOp, Box<Exp>, Box<Exp>),
}

impl Exp {
    pub fn int(value: i64) -> Self {
        Self::Int(value)
    }

    /// Token field read at the constructor start.
    pub fn field(name: &str) -> Self {
        Self::Field(name.into())
    }

    pub fn context(name: &str) -> Self {
        Self::Context(name.into())
    }

    pub fn operand(name: &str) -> Self {
        Self::Operand(name.into())
    }

    pub fn inst_start() -> Self {
        Self::InstStart
    }

    pub fn inst_next() -> Self {
        Self::InstNext
    }
}

impl From<i64> for Exp {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

macro_rules! impl_exp_ops {
    ($($trait:ident, $method:ident, $op:ident;)*) => ($(
        impl<T: Into<Exp>> ops::$trait<T> for Exp {
            type Output = Exp;

            fn $method(self, rhs: T) -> Exp {
                Exp::Binary(BinOp::$op, Box::new(self), Box::new(rhs.into()))
            }
        }
    )*);
}

impl_exp_ops! {
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

impl ops::Not for Exp {
    type Output = Exp;

    fn not(self) -> Exp {
        Exp::Not(Box::new(self))
    }
}

impl ops::Neg for Exp {
    type Output = Exp;

    fn neg(self) -> Exp {
        Exp::Neg(Box::new(self))
    }
}
