use std::{sync::Arc, thread};

use pcode::{Context, DecodeError, Error, LoadError, OpCode, Options, TranslateFlags};
use pcode_gen::{
    exp::Exp,
    val::{int, label, operand, reg, sized},
    SpecBuilder,
};

fn nop() -> Vec<u8> {
    SpecBuilder::new("nop")
        .space("ram", 4, 1)
        .token("byte", 8)
        .field("op", "byte", 0, 7)
        .constructor("instruction", "NOP", |c| {
            c.is("op", 0);
        })
        .to_bytes()
        .unwrap()
}

fn mini() -> Vec<u8> {
    SpecBuilder::new("mini")
        .space("ram", 4, 1)
        .space("register", 1, 1)
        .registers("register", 0, 1, &["a", "b"])
        .token("byte", 8)
        .field("op", "byte", 0, 7)
        .field("hi", "byte", 4, 7)
        .field("lo", "byte", 0, 3)
        .field("imm", "byte", 0, 7)
        .attach_registers("lo", &["a", "b"])
        .context_field("alt", 0, 0, 0)
        .constructor("instruction", "NOP", |c| {
            c.is("op", 0);
        })
        .constructor("instruction", "ANOP", |c| {
            c.context_is("alt", 1).is("op", 0);
        })
        .constructor("instruction", "MOV {lo}, {imm}", |c| {
            c.is("hi", 1)
                .field("lo")
                .field_at("imm", 1)
                .copy(operand("lo"), sized("imm", 1));
        })
        .constructor("instruction", "ALT", |c| {
            c.context_is("alt", 0)
                .is("op", 0xa0)
                .commit_context("alt", Exp::int(1));
        })
        .constructor("instruction", "X {rest}", |c| {
            c.is("op", 0xc0)
                .commit_context("alt", Exp::int(1))
                .table_at("rest", "suffix", 1);
        })
        .constructor("instruction", "Y", |c| {
            c.context_is("alt", 0).is("hi", 0xc);
        })
        .constructor("suffix", "S1", |c| {
            c.is("op", 1);
        })
        .constructor("instruction", "SKIP", |c| {
            let skip = c.label();
            c.is("op", 0xd0)
                .cbranch(label(skip), int(1, 1))
                .copy(reg("a"), int(0, 1))
                .place(skip);
        })
        .constructor("addr", "[{lo}]", |c| {
            c.field("lo").export_ptr("ram", operand("lo"), 1);
        })
        .constructor("instruction", "LD a, {m}", |c| {
            c.is("hi", 0xe)
                .table("m", "addr")
                .copy(reg("a"), operand("m"));
        })
        .to_bytes()
        .unwrap()
}

fn text(context: &Context, bytes: &[u8]) -> Vec<String> {
    context
        .disassemble(bytes, 0x1000, 100)
        .iter()
        .map(|i| i.to_string())
        .collect()
}

#[test]
fn nop_stream() {
    let context = Context::new(&nop()).unwrap();
    let dis = context.disassemble(&[0, 0, 0], 0x1000, 10);
    assert_eq!(dis.count(), 3);
    assert_eq!(dis.error, None);
    for (i, insn) in dis.iter().enumerate() {
        assert_eq!(insn.address, 0x1000 + i as u64);
        assert_eq!(insn.length, 1);
        assert_eq!(insn.mnemonic, "NOP");
        assert_eq!(insn.body, "");
    }

    let tr = context.translate(&[0, 0, 0], 0x1000, 10, TranslateFlags::empty());
    assert_eq!(tr.count(), 0);
    assert_eq!(tr.instructions.len(), 3);
    assert!(tr.instructions.iter().all(|i| i.ops.is_empty()));
}

#[test]
fn nop_stops_at_unknown_byte() {
    let context = Context::new(&nop()).unwrap();
    let dis = context.disassemble(&[0, 0, 0xff], 0x1000, 10);
    assert_eq!(dis.count(), 2);
    assert_eq!(dis.len_bytes(), 2);
    // relative to the instruction at len_bytes()
    assert_eq!(dis.error, Some(DecodeError::Failed(0)));
}

#[test]
fn limits() {
    let context = Context::new(&nop()).unwrap();
    let dis = context.disassemble(&[0, 0, 0], 0x1000, 0);
    assert!(dis.is_empty());
    assert_eq!(dis.error, None);
    assert!(context.disassemble(&[], 0x1000, 10).is_empty());
    assert_eq!(context.disassemble(&[0, 0, 0], 0x1000, 2).count(), 2);
    assert!(context
        .translate(&[0, 0], 0x1000, 0, TranslateFlags::empty())
        .instructions
        .is_empty());
}

#[test]
fn short_buffer() {
    let wide = SpecBuilder::new("wide")
        .space("ram", 4, 1)
        .token("half", 16)
        .field("op", "half", 0, 15)
        .constructor("instruction", "NOP", |c| {
            c.is("op", 0);
        })
        .to_bytes()
        .unwrap();
    let context = Context::new(&wide).unwrap();
    let dis = context.disassemble(&[0], 0x1000, 10);
    assert!(dis.is_empty());
    assert_eq!(dis.error, Some(DecodeError::More(2)));

    let context = Context::new(&mini()).unwrap();
    let dis = context.disassemble(&[0x00, 0x10], 0x1000, 10);
    assert_eq!(dis.count(), 1);
    assert_eq!(dis.error, Some(DecodeError::More(2)));
}

#[test]
fn operands() {
    let context = Context::new(&mini()).unwrap();
    assert_eq!(text(&context, &[0x11, 0x7f, 0x10, 0x05]), ["MOV b, 0x7f", "MOV a, 0x5"]);
    // "lo" has no register for 2
    let dis = context.disassemble(&[0x12, 0x00], 0x1000, 1);
    assert_eq!(dis.error, Some(DecodeError::Failed(0)));
}

#[test]
fn lengths_cover_input() {
    let context = Context::new(&mini()).unwrap();
    let code = [0x10, 0x05, 0x00, 0xd0, 0xe1, 0xc0, 0x01, 0x00];
    let dis = context.disassemble(&code, 0x1000, 100);
    assert_eq!(dis.error, None);
    assert_eq!(dis.len_bytes(), code.len());
    let mut address = 0x1000;
    for insn in dis.iter() {
        assert_eq!(insn.address, address);
        address += insn.length as u64;
    }
}

#[test]
fn deterministic() {
    let context = Context::new(&mini()).unwrap();
    let code = [0x10, 0x05, 0xa0, 0x00, 0xd0, 0xe1];
    assert_eq!(
        context.disassemble(&code, 0x1000, 10),
        context.disassemble(&code, 0x1000, 10)
    );
    let flags = TranslateFlags::INSTRUCTION_MARKERS;
    assert_eq!(
        context.translate(&code, 0x1000, 10, flags),
        context.translate(&code, 0x1000, 10, flags)
    );
}

#[test]
fn trailing_garbage() {
    let context = Context::new(&mini()).unwrap();
    let code = [0x10, 0x05, 0x00, 0xd0];
    let mut longer = code.to_vec();
    longer.extend_from_slice(&[0xff, 0xfe, 0x10]);
    let a = context.disassemble(&code, 0x1000, 10);
    let b = context.disassemble(&longer, 0x1000, 10);
    assert_eq!(a.instructions, b.instructions);
    assert!(b.error.is_some());
}

#[test]
fn context_commit() {
    let mut context = Context::new(&mini()).unwrap();
    assert_eq!(text(&context, &[0x00, 0xa0, 0x00, 0x00]), ["NOP", "ALT", "ANOP", "ANOP"]);
    // each call starts from the defaults
    assert_eq!(text(&context, &[0x00]), ["NOP"]);
    assert_eq!(context.context_default("alt"), Some(0));

    context.set_context_default("alt", 1).unwrap();
    assert_eq!(text(&context, &[0x00]), ["ANOP"]);
    assert_eq!(context.snapshot().words(), &[1]);
}

#[test]
fn unknown_context_variable() {
    let mut context = Context::new(&mini()).unwrap();
    let err = context.set_context_default("nope", 1).unwrap_err();
    assert_eq!(err, Error::UnknownContextVariable("nope".into()));
    assert_eq!(context.context_default("alt"), Some(0));
    assert_eq!(text(&context, &[0x00]), ["NOP"]);
}

#[test]
fn backtracking_restores_context() {
    let context = Context::new(&mini()).unwrap();
    // X needs suffix 01, Y only matches with alt clear
    assert_eq!(text(&context, &[0xc0, 0x01, 0x00]), ["X S1", "ANOP"]);
    assert_eq!(text(&context, &[0xc0, 0x00]), ["Y", "NOP"]);
    let dis = context.disassemble(&[0xc0, 0x02], 0x1000, 10);
    assert_eq!(dis.count(), 1);
    assert_eq!(dis.error, Some(DecodeError::Failed(0)));
}

#[test]
fn labels() {
    let context = Context::new(&mini()).unwrap();
    let tr = context.translate(&[0xd0], 0x1000, 1, TranslateFlags::BB_TERMINATING);
    assert_eq!(tr.count(), 2);
    let branch = &tr.ops[0];
    assert_eq!(branch.opcode, OpCode::CBranch);
    assert!(branch.inputs[0].is_constant());
    assert_eq!(branch.inputs[0].offset, 2);
    assert!(!branch.leaves_instruction());
    assert!(!branch.is_block_end());
}

#[test]
fn pointer_export() {
    let context = Context::new(&mini()).unwrap();
    assert_eq!(text(&context, &[0xe1]), ["LD a, [b]"]);
    let tr = context.translate(&[0xe1], 0x1000, 1, TranslateFlags::empty());
    let opcodes: Vec<OpCode> = tr.ops.iter().map(|i| i.opcode).collect();
    assert_eq!(opcodes, [OpCode::Load, OpCode::Copy]);

    let load = &tr.ops[0];
    let ram = context.space("ram").unwrap();
    assert!(load.inputs[0].is_constant());
    assert_eq!(load.inputs[0].offset, ram.index as u64);
    assert_eq!(load.inputs[0].size, 8);
    assert_eq!(load.inputs[1], context.register("b").unwrap().varnode);
    let tmp = load.output.as_ref().unwrap();
    assert!(tmp.space.is_unique());
    assert_eq!(tmp.size, 1);
    assert_eq!(tr.ops[1].inputs[0], *tmp);
}

#[test]
fn instruction_markers() {
    let context = Context::new(&mini()).unwrap();
    let tr = context.translate(&[0x00, 0x10, 0x05], 0x2000, 10, TranslateFlags::INSTRUCTION_MARKERS);
    assert_eq!(tr.instructions.len(), 2);
    let marks: Vec<_> = tr
        .ops
        .iter()
        .filter(|i| i.opcode == OpCode::Imark)
        .map(|i| (i.inputs[0].offset, i.inputs[0].size))
        .collect();
    assert_eq!(marks, [(0x2000, 1), (0x2001, 2)]);
    let second = tr.instruction_ops(&tr.instructions[1]);
    assert_eq!(second.len(), 2);
    assert_eq!(second[1].opcode, OpCode::Copy);
}

#[test]
fn registers_round_trip() {
    let context = Context::new(&mini()).unwrap();
    let list = context.list_registers();
    assert_eq!(list.len(), 2);
    for info in &list {
        let vn = &context.register(&info.name).unwrap().varnode;
        assert_eq!(
            context.register_name(&vn.space, vn.offset, vn.size),
            Some(info.name.as_str())
        );
    }
    let register = context.space("register").unwrap();
    assert_eq!(context.register_name(register, 0, 2), None);
    assert_eq!(
        context.register("c").unwrap_err(),
        Error::UnknownRegister("c".into())
    );
}

#[test]
fn spaces() {
    let context = Context::new(&mini()).unwrap();
    assert!(context.space_for_constant(42).is_constant());
    assert_eq!(context.space("nope").unwrap_err(), Error::UnknownSpace);
    assert!(context.space_by_index(100).is_err());
    let ram = context.space("ram").unwrap();
    assert_eq!(context.space_by_index(ram.index as usize).unwrap().name, "ram");
    assert_eq!(context.spaces().default_space().name, "ram");
}

#[test]
fn load_errors() {
    assert!(matches!(
        Context::new(b"junk"),
        Err(Error::Load(LoadError::BadMagic))
    ));
    let blob = nop();
    assert!(matches!(
        Context::new(&blob[..blob.len() - 1]),
        Err(Error::Load(_))
    ));
    assert!(matches!(
        Context::from_id("nope:LE:8:default"),
        Err(Error::UnknownLanguage(_))
    ));
}

#[test]
fn instruction_length_limit() {
    let opts = Options {
        max_insn_len: 1,
        ..Options::default()
    };
    let context = Context::with_options(&mini(), opts).unwrap();
    let dis = context.disassemble(&[0x00, 0x10, 0x05], 0x1000, 10);
    assert_eq!(dis.count(), 1);
    assert_eq!(dis.error, Some(DecodeError::Failed(0)));
}

#[test]
fn without_decision_trees() {
    let opts = Options {
        decision_trees: false,
        ..Options::default()
    };
    let fast = Context::new(&mini()).unwrap();
    let slow = Context::with_options(&mini(), opts).unwrap();
    let code = [0x10, 0x05, 0xa0, 0x00, 0xc0, 0x01, 0xd0, 0xe1];
    assert_eq!(fast.disassemble(&code, 0, 10), slow.disassemble(&code, 0, 10));
}

#[test]
fn forks_share_language() {
    let context = Context::new(&mini()).unwrap();
    let mut fork = context.fork();
    assert!(Arc::ptr_eq(context.language(), fork.language()));
    fork.set_context_default("alt", 1).unwrap();
    assert_eq!(text(&fork, &[0x00]), ["ANOP"]);
    assert_eq!(text(&context, &[0x00]), ["NOP"]);

    let code = [0x10, 0x05, 0xa0, 0x00, 0xd0, 0xe1];
    let expect = context.translate(&code, 0x1000, 10, TranslateFlags::empty());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let context = context.fork();
            thread::spawn(move || context.translate(&code, 0x1000, 10, TranslateFlags::empty()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expect);
    }
}

#[test]
fn shorter_candidate_at_end() {
    let context = Context::new(&mini()).unwrap();
    // X needs a suffix byte, Y fits
    let dis = context.disassemble(&[0xc0], 0x1000, 10);
    assert_eq!(text(&context, &[0xc0]), ["Y"]);
    assert_eq!(dis.error, None);
    let longer = context.disassemble(&[0xc0, 0xff], 0x1000, 10);
    assert_eq!(dis.instructions, longer.instructions);

    let lang = SpecBuilder::new("pair")
        .space("ram", 4, 1)
        .token("byte", 8)
        .field("op", "byte", 0, 7)
        .constructor("instruction", "SHORT", |c| {
            c.is("op", 0x12);
        })
        .constructor("instruction", "LONG", |c| {
            c.is("op", 0x12).is_at(1, "op", 0x34);
        })
        .to_bytes()
        .unwrap();
    let context = Context::new(&lang).unwrap();
    let dis = context.disassemble(&[0x12], 0x1000, 10);
    assert_eq!(text(&context, &[0x12]), ["SHORT"]);
    assert_eq!(dis.error, None);
    assert_eq!(text(&context, &[0x12, 0x34]), ["LONG"]);
    assert_eq!(text(&context, &[0x12, 0x12]), ["SHORT", "SHORT"]);
}

fn recursive() -> Vec<u8> {
    SpecBuilder::new("recursive")
        .space("ram", 4, 1)
        .token("byte", 8)
        .field("op", "byte", 0, 7)
        .constructor("instruction", "A {x}", |c| {
            c.table("x", "instruction");
        })
        .constructor("instruction", "B {x}", |c| {
            c.table("x", "instruction");
        })
        .to_bytes()
        .unwrap()
}

#[test]
fn recursive_tables_fail_fast() {
    let context = Context::new(&recursive()).unwrap();
    assert_eq!(context.language().options().max_depth, 64);
    let dis = context.disassemble(&[0x00], 0x1000, 10);
    assert!(dis.is_empty());
    assert_eq!(dis.error, Some(DecodeError::Failed(0)));

    let tr = context.translate(&[0x00, 0x00], 0x1000, 10, TranslateFlags::empty());
    assert!(tr.instructions.is_empty());
}

#[test]
fn match_step_limit() {
    let opts = Options {
        max_steps: 1,
        ..Options::default()
    };
    let context = Context::with_options(&mini(), opts).unwrap();
    // X S1 needs two constructors
    let dis = context.disassemble(&[0x00, 0xc0, 0x01], 0x1000, 10);
    assert_eq!(dis.count(), 1);
    assert_eq!(dis.error, Some(DecodeError::Failed(0)));
}

fn overlapping(swap: bool) -> Vec<u8> {
    let hi = |b: SpecBuilder| {
        b.constructor("instruction", "HI", |c| {
            c.is("hi", 1);
        })
    };
    let lo = |b: SpecBuilder| {
        b.constructor("instruction", "LO", |c| {
            c.is("lo", 0);
        })
    };
    let b = SpecBuilder::new("overlap")
        .space("ram", 4, 1)
        .token("byte", 8)
        .field("hi", "byte", 4, 7)
        .field("lo", "byte", 0, 3);
    let b = if swap { lo(hi(b)) } else { hi(lo(b)) };
    b.to_bytes().unwrap()
}

#[test]
fn first_declared_wins() {
    for trees in [true, false] {
        let opts = Options {
            decision_trees: trees,
            ..Options::default()
        };
        for (swap, first) in [(false, "LO"), (true, "HI")] {
            let context = Context::with_options(&overlapping(swap), opts).unwrap();
            assert_eq!(
                text(&context, &[0x10, 0x11, 0x20]),
                [first, "HI", "LO"],
                "trees: {trees}, swap: {swap}"
            );
        }
    }
}

#[test]
fn temporaries_restart_per_call() {
    let context = Context::new(&mini()).unwrap();
    let temp = |tr: &pcode::Translation, i: usize| tr.ops[i].output.as_ref().unwrap().offset;
    let both = context.translate(&[0xe1, 0xe1], 0x1000, 10, TranslateFlags::empty());
    assert_eq!(temp(&both, 0), 0x1000_0000);
    assert_eq!(temp(&both, 2), 0x1000_0010);
    let single = context.translate(&[0xe1], 0x1002, 10, TranslateFlags::empty());
    assert_eq!(temp(&single, 0), 0x1000_0000);
}
