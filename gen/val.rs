/// Branch target placed inside the semantics of one constructor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label(pub(crate) u32);

/// Address part of [`Val::Addr`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Addr {
    Operand(String),
    InstStart,
    InstNext,
}

/// Varnode used by a semantic statement, referring to registers, operands
/// and spaces by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Val {
    Reg(String),
    /// Whole value of an operand: its register, constant or export.
    Operand(String),
    /// Operand value with an explicit size.
    Sized(String, u32),
    Const(u64, u32),
    /// Temporary in the unique space, `(offset, size)`.
    Temp(u64, u32),
    /// Location in a named space, size defaults to the space address size.
    Addr {
        space: String,
        addr: Addr,
        size: Option<u32>,
    },
    /// Constant naming a space, input of LOAD and STORE.
    SpaceId(String),
    /// Relative distance to a label.
    Label(Label, u32),
}

pub fn reg(name: &str) -> Val {
    Val::Reg(name.into())
}

pub fn operand(name: &str) -> Val {
    Val::Operand(name.into())
}

pub fn sized(name: &str, size: u32) -> Val {
    Val::Sized(name.into(), size)
}

pub fn int(value: u64, size: u32) -> Val {
    Val::Const(value, size)
}

/// `space[operand]`, a code or data address taken from an operand.
pub fn addr(space: &str, operand: &str) -> Val {
    Val::Addr {
        space: space.into(),
        addr: Addr::Operand(operand.into()),
        size: None,
    }
}

pub fn inst_next(space: &str) -> Val {
    Val::Addr {
        space: space.into(),
        addr: Addr::InstNext,
        size: None,
    }
}

pub fn inst_start(space: &str) -> Val {
    Val::Addr {
        space: space.into(),
        addr: Addr::InstStart,
        size: None,
    }
}

pub fn space_id(space: &str) -> Val {
    Val::SpaceId(space.into())
}

pub fn label(label: Label) -> Val {
    Val::Label(label, 4)
}

/// Address of the next instruction as a constant of `size` bytes.
pub fn next_address(size: u32) -> Val {
    Val::Addr {
        space: "const".into(),
        addr: Addr::InstNext,
        size: Some(size),
    }
}
