use std::fmt::{self, Write};

use crate::{op::PcodeOp, opcode::OpCode, space::AddressSpace, varnode::Varnode};

pub struct FormatterFn<F>(pub F)
where
    F: Fn(&mut fmt::Formatter) -> fmt::Result;

impl<F> fmt::Display for FormatterFn<F>
where
    F: Fn(&mut fmt::Formatter) -> fmt::Result,
{
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.0(fmt)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Style {
    Mnemonic,
    Register,
    Immediate,
    Address,
    Space,
    Operator,
    Comment,
}

pub trait PrinterExt {
    fn print_styled(
        &self,
        fmt: &mut fmt::Formatter,
        #[allow(unused_variables)] style: Style,
        display: impl fmt::Display,
    ) -> fmt::Result {
        display.fmt(fmt)
    }

    fn print_mnemonic(&self, fmt: &mut fmt::Formatter, display: impl fmt::Display) -> fmt::Result {
        self.print_styled(fmt, Style::Mnemonic, display)
    }

    fn print_register(&self, fmt: &mut fmt::Formatter, display: impl fmt::Display) -> fmt::Result {
        self.print_styled(fmt, Style::Register, display)
    }

    fn print_immediate(&self, fmt: &mut fmt::Formatter, display: impl fmt::Display) -> fmt::Result {
        self.print_styled(fmt, Style::Immediate, display)
    }

    fn print_address(&self, fmt: &mut fmt::Formatter, display: impl fmt::Display) -> fmt::Result {
        self.print_styled(fmt, Style::Address, display)
    }

    fn print_space(&self, fmt: &mut fmt::Formatter, display: impl fmt::Display) -> fmt::Result {
        self.print_styled(fmt, Style::Space, display)
    }

    fn print_operator(&self, fmt: &mut fmt::Formatter, display: impl fmt::Display) -> fmt::Result {
        self.print_styled(fmt, Style::Operator, display)
    }

    fn print_comment(&self, fmt: &mut fmt::Formatter, display: impl fmt::Display) -> fmt::Result {
        self.print_styled(fmt, Style::Comment, display)
    }
}

impl PrinterExt for () {}

/// Symbolic names available while printing p-code.
pub trait Names {
    fn register_name(&self, space: &AddressSpace, offset: u64, size: i32) -> Option<&str>;

    /// Space encoded by the constant input of LOAD and STORE.
    fn space_name(&self, index: u64) -> Option<&str>;

    fn user_op_name(&self, index: u64) -> Option<&str>;
}

impl Names for () {
    fn register_name(&self, _: &AddressSpace, _: u64, _: i32) -> Option<&str> {
        None
    }

    fn space_name(&self, _: u64) -> Option<&str> {
        None
    }

    fn user_op_name(&self, _: u64) -> Option<&str> {
        None
    }
}

#[derive(Copy, Clone)]
enum Form {
    Unary(&'static str),
    Binary(&'static str),
    Function(&'static str),
    Special,
    Default,
}

fn form(opcode: OpCode) -> Form {
    use OpCode as O;

    match opcode {
        O::Copy => Form::Unary(""),
        O::IntNegate => Form::Unary("~"),
        O::Int2Comp => Form::Unary("-"),
        O::BoolNegate => Form::Unary("!"),
        O::FloatNeg => Form::Unary("f-"),

        O::IntAdd => Form::Binary("+"),
        O::IntSub => Form::Binary("-"),
        O::IntMult => Form::Binary("*"),
        O::IntDiv => Form::Binary("/"),
        O::IntSDiv => Form::Binary("s/"),
        O::IntRem => Form::Binary("%"),
        O::IntSRem => Form::Binary("s%"),
        O::IntAnd => Form::Binary("&"),
        O::IntOr => Form::Binary("|"),
        O::IntXor => Form::Binary("^"),
        O::IntLeft => Form::Binary("<<"),
        O::IntRight => Form::Binary(">>"),
        O::IntSRight => Form::Binary("s>>"),
        O::IntEqual => Form::Binary("=="),
        O::IntNotEqual => Form::Binary("!="),
        O::IntLess => Form::Binary("<"),
        O::IntLessEqual => Form::Binary("<="),
        O::IntSLess => Form::Binary("s<"),
        O::IntSLessEqual => Form::Binary("s<="),
        O::BoolAnd => Form::Binary("&&"),
        O::BoolOr => Form::Binary("||"),
        O::BoolXor => Form::Binary("^^"),
        O::FloatAdd => Form::Binary("f+"),
        O::FloatSub => Form::Binary("f-"),
        O::FloatMult => Form::Binary("f*"),
        O::FloatDiv => Form::Binary("f/"),
        O::FloatEqual => Form::Binary("f=="),
        O::FloatNotEqual => Form::Binary("f!="),
        O::FloatLess => Form::Binary("f<"),
        O::FloatLessEqual => Form::Binary("f<="),

        O::IntZext => Form::Function("zext"),
        O::IntSext => Form::Function("sext"),
        O::IntCarry => Form::Function("carry"),
        O::IntSCarry => Form::Function("scarry"),
        O::IntSBorrow => Form::Function("sborrow"),
        O::FloatAbs => Form::Function("abs"),
        O::FloatSqrt => Form::Function("sqrt"),
        O::FloatNan => Form::Function("nan"),
        O::FloatCeil => Form::Function("ceil"),
        O::FloatFloor => Form::Function("floor"),
        O::FloatRound => Form::Function("round"),
        O::FloatTrunc => Form::Function("trunc"),
        O::FloatInt2Float => Form::Function("int2float"),
        O::FloatFloat2Float => Form::Function("float2float"),
        O::CPoolRef => Form::Function("cpool"),
        O::New => Form::Function("newobject"),
        O::PopCount => Form::Function("popcount"),
        O::LzCount => Form::Function("lzcount"),

        O::Branch
        | O::BranchInd
        | O::CBranch
        | O::Call
        | O::CallInd
        | O::CallOther
        | O::Load
        | O::Store
        | O::Return => Form::Special,

        _ => Form::Default,
    }
}

/// Prints varnodes and operations.
pub struct OpPrinter<'a, E: PrinterExt, N: Names + ?Sized> {
    ext: &'a E,
    names: &'a N,
}

impl<'a, E: PrinterExt, N: Names + ?Sized> OpPrinter<'a, E, N> {
    pub fn new(ext: &'a E, names: &'a N) -> Self {
        Self { ext, names }
    }

    pub fn print_varnode(&self, fmt: &mut fmt::Formatter, vn: &Varnode) -> fmt::Result {
        let ext = self.ext;
        if vn.is_constant() {
            return ext.print_immediate(fmt, FormatterFn(|fmt| write!(fmt, "{:#x}", vn.offset)));
        }
        if let Some(name) = self.names.register_name(&vn.space, vn.offset, vn.size) {
            return ext.print_register(fmt, name);
        }
        ext.print_space(fmt, &vn.space.name)?;
        write!(fmt, "[{:x}:{}]", vn.offset, vn.size)
    }

    fn print_list(&self, fmt: &mut fmt::Formatter, list: &[Varnode]) -> fmt::Result {
        for (i, vn) in list.iter().enumerate() {
            if i != 0 {
                fmt.write_str(", ")?;
            }
            self.print_varnode(fmt, vn)?;
        }
        Ok(())
    }

    fn print_pointer(&self, fmt: &mut fmt::Formatter, space: &Varnode, ptr: &Varnode) -> fmt::Result {
        fmt.write_str("*[")?;
        match self.names.space_name(space.offset) {
            Some(name) => self.ext.print_space(fmt, name)?,
            None => self.print_varnode(fmt, space)?,
        }
        fmt.write_char(']')?;
        self.print_varnode(fmt, ptr)
    }

    fn print_special(&self, fmt: &mut fmt::Formatter, op: &PcodeOp) -> Option<fmt::Result> {
        let ext = self.ext;
        let inputs = op.inputs.as_slice();
        let res = match (op.opcode, inputs) {
            (OpCode::Branch, [dest, ..]) => ext
                .print_mnemonic(fmt, "goto ")
                .and_then(|_| self.print_varnode(fmt, dest)),
            (OpCode::BranchInd, [dest, ..]) => ext.print_mnemonic(fmt, "goto ").and_then(|_| {
                fmt.write_char('[')?;
                self.print_varnode(fmt, dest)?;
                fmt.write_char(']')
            }),
            (OpCode::Call, [dest, ..]) => ext
                .print_mnemonic(fmt, "call ")
                .and_then(|_| self.print_varnode(fmt, dest)),
            (OpCode::CallInd, [dest, ..]) => ext.print_mnemonic(fmt, "call ").and_then(|_| {
                fmt.write_char('[')?;
                self.print_varnode(fmt, dest)?;
                fmt.write_char(']')
            }),
            (OpCode::CBranch, [dest, cond, ..]) => (|| {
                ext.print_mnemonic(fmt, "if ")?;
                fmt.write_char('(')?;
                self.print_varnode(fmt, cond)?;
                fmt.write_str(") ")?;
                ext.print_mnemonic(fmt, "goto ")?;
                self.print_varnode(fmt, dest)
            })(),
            (OpCode::Load, [space, ptr, ..]) => self.print_pointer(fmt, space, ptr),
            (OpCode::Store, [space, ptr, value, ..]) => (|| {
                self.print_pointer(fmt, space, ptr)?;
                ext.print_operator(fmt, " = ")?;
                self.print_varnode(fmt, value)
            })(),
            (OpCode::Return, [dest, ..]) => ext
                .print_mnemonic(fmt, "return ")
                .and_then(|_| self.print_varnode(fmt, dest)),
            (OpCode::CallOther, [index, args @ ..]) if index.is_constant() => {
                let name = self.names.user_op_name(index.offset)?;
                (|| {
                    ext.print_mnemonic(fmt, name)?;
                    fmt.write_char('(')?;
                    self.print_list(fmt, args)?;
                    fmt.write_char(')')
                })()
            }
            _ => return None,
        };
        Some(res)
    }

    pub fn print_op(&self, fmt: &mut fmt::Formatter, op: &PcodeOp) -> fmt::Result {
        let ext = self.ext;
        if let Some(output) = &op.output {
            self.print_varnode(fmt, output)?;
            ext.print_operator(fmt, " = ")?;
        }
        match (form(op.opcode), op.inputs.as_slice()) {
            (Form::Unary(operator), [a]) => {
                ext.print_operator(fmt, operator)?;
                self.print_varnode(fmt, a)
            }
            (Form::Binary(operator), [a, b]) => {
                self.print_varnode(fmt, a)?;
                fmt.write_char(' ')?;
                ext.print_operator(fmt, operator)?;
                fmt.write_char(' ')?;
                self.print_varnode(fmt, b)
            }
            (Form::Function(name), inputs) => {
                ext.print_mnemonic(fmt, name)?;
                fmt.write_char('(')?;
                self.print_list(fmt, inputs)?;
                fmt.write_char(')')
            }
            (Form::Special, _) => match self.print_special(fmt, op) {
                Some(res) => res,
                None => self.print_default(fmt, op),
            },
            _ => self.print_default(fmt, op),
        }
    }

    fn print_default(&self, fmt: &mut fmt::Formatter, op: &PcodeOp) -> fmt::Result {
        self.ext.print_mnemonic(fmt, op.opcode.name())?;
        if !op.inputs.is_empty() {
            fmt.write_char(' ')?;
            self.print_list(fmt, &op.inputs)?;
        }
        Ok(())
    }

    pub fn display_op<'b>(&'b self, op: &'b PcodeOp) -> impl fmt::Display + 'b {
        FormatterFn(move |fmt| self.print_op(fmt, op))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::space::SpaceKind;

    struct Regs {
        ram: Arc<AddressSpace>,
    }

    impl Names for Regs {
        fn register_name(&self, space: &AddressSpace, offset: u64, size: i32) -> Option<&str> {
            match (space.name.as_str(), offset, size) {
                ("register", 0, 2) => Some("r0"),
                ("register", 2, 2) => Some("r1"),
                _ => None,
            }
        }

        fn space_name(&self, index: u64) -> Option<&str> {
            (index == self.ram.index as u64).then_some(self.ram.name.as_str())
        }

        fn user_op_name(&self, index: u64) -> Option<&str> {
            (index == 0).then_some("syscall")
        }
    }

    fn spaces() -> (Arc<AddressSpace>, Arc<AddressSpace>, Arc<AddressSpace>, Arc<AddressSpace>) {
        let c = Arc::new(AddressSpace::new("const", 0, SpaceKind::Constant, 8, 1));
        let unique = Arc::new(AddressSpace::new("unique", 1, SpaceKind::Internal, 4, 1));
        let ram = Arc::new(AddressSpace::new("ram", 2, SpaceKind::Processor, 2, 1));
        let reg = Arc::new(AddressSpace::new("register", 3, SpaceKind::Processor, 2, 1));
        (c, unique, ram, reg)
    }

    fn print(names: &Regs, op: &PcodeOp) -> String {
        OpPrinter::new(&(), names).display_op(op).to_string()
    }

    #[test]
    fn forms() {
        let (c, unique, ram, reg) = spaces();
        let names = Regs { ram: ram.clone() };
        let r0 = Varnode::new(reg.clone(), 0, 2);
        let r1 = Varnode::new(reg.clone(), 2, 2);
        let tmp = Varnode::new(unique.clone(), 0x100, 2);
        let k = |v| Varnode::new(c.clone(), v, 2);

        let op = PcodeOp::new(OpCode::IntAdd, Some(r0.clone()), vec![r0.clone(), r1.clone()]);
        assert_eq!(print(&names, &op), "r0 = r0 + r1");

        let op = PcodeOp::new(OpCode::Copy, Some(tmp.clone()), vec![k(5)]);
        assert_eq!(print(&names, &op), "unique[100:2] = 0x5");

        let op = PcodeOp::new(OpCode::IntZext, Some(r0.clone()), vec![tmp.clone()]);
        assert_eq!(print(&names, &op), "r0 = zext(unique[100:2])");

        let op = PcodeOp::new(OpCode::IntNegate, Some(r1.clone()), vec![r0.clone()]);
        assert_eq!(print(&names, &op), "r1 = ~r0");

        let space = Varnode::new(c.clone(), ram.index as u64, 8);
        let op = PcodeOp::new(OpCode::Load, Some(r0.clone()), vec![space.clone(), r1.clone()]);
        assert_eq!(print(&names, &op), "r0 = *[ram]r1");

        let op = PcodeOp::new(OpCode::Store, None, vec![space, r1.clone(), r0.clone()]);
        assert_eq!(print(&names, &op), "*[ram]r1 = r0");

        let dest = Varnode::new(ram.clone(), 0x1000, 2);
        let flag = Varnode::new(reg.clone(), 0x20, 1);
        let op = PcodeOp::new(OpCode::CBranch, None, vec![dest.clone(), flag]);
        assert_eq!(print(&names, &op), "if (register[20:1]) goto ram[1000:2]");

        let op = PcodeOp::new(OpCode::BranchInd, None, vec![r0.clone()]);
        assert_eq!(print(&names, &op), "goto [r0]");

        let op = PcodeOp::new(OpCode::Return, None, vec![r1]);
        assert_eq!(print(&names, &op), "return r1");

        let op = PcodeOp::new(OpCode::CallOther, None, vec![k(0), k(3)]);
        assert_eq!(print(&names, &op), "syscall(0x3)");

        let op = PcodeOp::new(OpCode::Piece, Some(r0), vec![k(1), k(2)]);
        assert_eq!(print(&names, &op), "r0 = PIECE 0x1, 0x2");
    }
}
