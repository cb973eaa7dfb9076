use pcode::{Arch, Context, TranslateFlags};
use pcode_test::test::{self, Runner, Test};

#[derive(Default)]
struct Toy {
    flags: &'static str,
}

impl Toy {
    fn flags<'a>(&self, test: &Test<'a>) -> impl Iterator<Item = (&'a str, bool)> {
        test::parse_flags(self.flags).chain(test::parse_flags(test.comment))
    }
}

impl Runner for Toy {
    fn create(&mut self, test: &Test) -> Context {
        let mut context = Context::from_arch(Arch::Toy).unwrap();
        for (name, state) in self.flags(test) {
            match name {
                "mode1" => context.set_context_default("mode", state as u32).unwrap(),
                "markers" => {}
                _ => panic!("unexpected flag {name}"),
            }
        }
        context
    }

    fn translate_flags(&self, test: &Test) -> TranslateFlags {
        let mut flags = TranslateFlags::empty();
        for (name, state) in self.flags(test) {
            if name == "markers" && state {
                flags |= TranslateFlags::INSTRUCTION_MARKERS;
            }
        }
        flags
    }
}

macro_rules! test {
    ($name:ident, $file:expr, $flags:expr) => {
        #[test]
        fn $name() -> Result<(), String> {
            Toy { flags: $flags }.run($file, include_str!($file))
        }
    };
}

test!(basic, "basic.test", "");
test!(memory, "memory.test", "");
test!(branch, "branch.test", "");
test!(compact, "compact.test", "");

fn toy() -> Context {
    Context::from_id("TOY:be:16:DEFAULT").unwrap()
}

#[test]
fn invalid_register() {
    let dis = toy().disassemble(&[0x18, 0x00], 0x1000, 1);
    assert!(dis.is_empty());
    assert!(matches!(dis.error, Some(pcode::DecodeError::Failed(_))));
}

#[test]
fn mode_switch() {
    let code = [0x90, 0x01, 0x20, 0x41, 0xe0, 0x00, 0x00];
    let dis = toy().disassemble(&code, 0x1000, 10);
    let text: Vec<String> = dis.iter().map(|i| i.to_string()).collect();
    assert_eq!(text, ["SETM 0x1", "INC r0", "DEC r1", "SETM 0", "NOP"]);
    assert_eq!(dis.len_bytes(), code.len());
    assert_eq!(dis.error, None);
}

#[test]
fn mode_is_per_pass() {
    let context = toy();
    context.disassemble(&[0x90, 0x01], 0x1000, 1);
    let dis = context.disassemble(&[0x00, 0x00], 0x1000, 1);
    assert_eq!(dis.instructions[0].length, 2);
    assert_eq!(context.context_default("mode"), Some(0));
}

#[test]
fn nested_prefix() {
    let dis = toy().disassemble(&[0xfe, 0xfe, 0x23, 0x00, 0x12, 0x34], 0x1000, 1);
    assert!(dis.is_empty());
    assert!(dis.error.is_some());
}

#[test]
fn truncated_call() {
    let dis = toy().disassemble(&[0x00, 0x00, 0x70, 0x00, 0x20], 0x1000, 10);
    assert_eq!(dis.count(), 1);
    assert_eq!(dis.error, Some(pcode::DecodeError::More(4)));
}

#[test]
fn temporaries_do_not_alias() {
    // two instructions using one temporary each
    let code = [0x80, 0x00, 0x80, 0x00];
    let tr = toy().translate(&code, 0x1000, 2, TranslateFlags::empty());
    let first = &tr.ops[0];
    let second = &tr.ops[3];
    assert_eq!(first.opcode, pcode::OpCode::Load);
    assert_eq!(second.opcode, pcode::OpCode::Load);
    let a = first.output.as_ref().unwrap();
    let b = second.output.as_ref().unwrap();
    assert!(a.space.is_unique() && b.space.is_unique());
    assert_ne!(a.offset, b.offset);
}

#[test]
fn block_end() {
    let code = [0x10, 0x10, 0x80, 0x00, 0x00, 0x00];
    let flags = TranslateFlags::BB_TERMINATING | TranslateFlags::STOP_AT_BLOCK_END;
    let tr = toy().translate(&code, 0x1000, 10, flags);
    assert_eq!(tr.instructions.len(), 2);
    let ret = tr.ops.last().unwrap();
    assert_eq!(ret.opcode, pcode::OpCode::Return);
    assert!(ret.is_block_end());
    assert!(tr.ops[..tr.ops.len() - 1].iter().all(|op| !op.is_block_end()));
}

#[test]
fn internal_branch_keeps_block() {
    let flags = TranslateFlags::BB_TERMINATING | TranslateFlags::STOP_AT_BLOCK_END;
    let tr = toy().translate(&[0xa1, 0x00, 0x00, 0x00], 0x1000, 10, flags);
    assert_eq!(tr.instructions.len(), 2);
    assert!(tr.ops.iter().all(|op| !op.is_block_end()));
}

#[test]
fn registers() {
    let context = toy();
    let sp = context.register("sp").unwrap();
    assert_eq!(sp.varnode.offset, 0x10);
    assert_eq!(sp.varnode.size, 2);
    let space = context.space("register").unwrap();
    assert_eq!(context.register_name(space, 0, 4), Some("r0r1"));
    assert_eq!(context.register_name(space, 0, 2), Some("r0"));
    assert_eq!(context.register_name(space, 0x21, 1), Some("C"));
    assert_eq!(context.register_name(space, 0x22, 1), None);
    assert!(context.register("r8").is_err());
    assert_eq!(context.registers().len(), 13);
}
