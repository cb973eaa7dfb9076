use pcode_gen::{
    exp::Exp,
    val::{addr, int, label, next_address, operand, reg},
    OpCode, SpecBuilder,
};

const GPR: &[&str] = &["r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7"];

// register fields are 4 bits wide, encodings 8..15 are invalid
const GPR4: &[&str] = &[
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "_", "_", "_", "_", "_", "_", "_", "_",
];

const ALU: &[(&str, OpCode)] = &[
    ("ADD", OpCode::IntAdd),
    ("SUB", OpCode::IntSub),
    ("AND", OpCode::IntAnd),
    ("OR", OpCode::IntOr),
    ("XOR", OpCode::IntXor),
];

pub fn language() -> SpecBuilder {
    let lang = SpecBuilder::new("toy")
        .big_endian(true)
        .space("ram", 2, 1)
        .space("register", 1, 1)
        .registers("register", 0, 2, GPR)
        .register("sp", "register", 0x10, 2)
        .register("pc", "register", 0x12, 2)
        .register("Z", "register", 0x20, 1)
        .register("C", "register", 0x21, 1)
        .register("r0r1", "register", 0, 4)
        .token("insn", 16)
        .field("word", "insn", 0, 15)
        .field("op4", "insn", 12, 15)
        .field("sub", "insn", 8, 11)
        .field("rd", "insn", 8, 11)
        .field("rs", "insn", 4, 7)
        .field("fn4", "insn", 0, 3)
        .field("imm8", "insn", 0, 7)
        .field("simm8", "insn", 0, 7)
        .field("simm12", "insn", 0, 11)
        .signed("simm8")
        .signed("simm12")
        .attach_registers("rd", GPR4)
        .attach_registers("rs", GPR4)
        .token("imm", 16)
        .field("abs16", "imm", 0, 15)
        .token("prefix", 8)
        .field("pfx", "prefix", 0, 7)
        .token("byte", 8)
        .field("b8", "byte", 0, 7)
        .field("cop", "byte", 5, 7)
        .field("creg", "byte", 0, 2)
        .attach_registers("creg", GPR)
        .context_field("mode", 0, 0, 1)
        .context_field("wide", 0, 2, 2)
        .user_op("syscall")
        .table("instruction")
        .table("addr");

    let lang = basic(lang);
    let lang = memory(lang);
    let lang = branches(lang);
    compact(lang)
}

fn basic(lang: SpecBuilder) -> SpecBuilder {
    let lang = ALU
        .iter()
        .enumerate()
        .fold(lang, |lang, (i, &(name, opcode))| {
            let display = format!("{name} {{rd}}, {{rs}}");
            lang.constructor("instruction", &display, |c| {
                c.context_is("mode", 0)
                    .is("op4", 1)
                    .is("fn4", i as u64)
                    .field("rd")
                    .field("rs");
                match opcode {
                    OpCode::IntAdd => {
                        c.op(OpCode::IntCarry, reg("C"), &[operand("rd"), operand("rs")]);
                    }
                    OpCode::IntSub => {
                        c.op(OpCode::IntLess, reg("C"), &[operand("rd"), operand("rs")]);
                    }
                    _ => {}
                }
                c.op(opcode, operand("rd"), &[operand("rd"), operand("rs")])
                    .op(OpCode::IntEqual, reg("Z"), &[operand("rd"), int(0, 2)]);
            })
        });

    lang.constructor("instruction", "NOP", |c| {
        c.context_is("mode", 0).is("word", 0);
    })
    .constructor("instruction", "MOVI {rd}, {imm8}", |c| {
        c.context_is("mode", 0)
            .is("op4", 2)
            .field("rd")
            .field("imm8")
            .copy(operand("rd"), operand("imm8"));
    })
    .constructor("instruction", "MOVI {rd}, {abs16}", |c| {
        c.context_is("mode", 0)
            .context_is("wide", 1)
            .is("op4", 2)
            .field("rd")
            .field_at("abs16", 2)
            .copy(operand("rd"), operand("abs16"));
    })
    // 0xfe prefix widens the immediate of the next instruction
    .constructor("instruction", "{rest}", |c| {
        c.context_is("mode", 0)
            .context_is("wide", 0)
            .is("pfx", 0xfe)
            .set_context("wide", Exp::int(1))
            .table_at("rest", "instruction", 1);
    })
    .constructor("instruction", "MUL {rd}, {rs}", |c| {
        c.context_is("mode", 0).is("op4", 0xc).field("rd").field("rs");
        let a = c.temp(4);
        let b = c.temp(4);
        c.op(OpCode::IntZext, a.clone(), &[operand("rd")])
            .op(OpCode::IntZext, b.clone(), &[operand("rs")])
            .op(OpCode::IntMult, reg("r0r1"), &[a, b]);
    })
    .constructor("instruction", "ABS {rd}", |c| {
        c.context_is("mode", 0).is("op4", 0xa).field("rd");
        let done = c.label();
        let negative = c.temp(1);
        let positive = c.temp(1);
        c.op(OpCode::IntSLess, negative.clone(), &[operand("rd"), int(0, 2)])
            .op(OpCode::BoolNegate, positive.clone(), &[negative])
            .cbranch(label(done), positive)
            .op(OpCode::Int2Comp, operand("rd"), &[operand("rd")])
            .place(done);
    })
    .constructor("instruction", "SETM {imm8}", |c| {
        c.context_is("mode", 0)
            .is("op4", 9)
            .field("imm8")
            .commit_context("mode", Exp::field("imm8"));
    })
    .constructor("instruction", "SYSCALL {imm8}", |c| {
        c.context_is("mode", 0)
            .is("op4", 0xb)
            .field("imm8")
            .call_other("syscall", None, &[operand("imm8")]);
    })
}

fn memory(lang: SpecBuilder) -> SpecBuilder {
    lang.constructor("addr", "[{rs}]", |c| {
        c.is("fn4", 0)
            .field("rs")
            .export_ptr("ram", operand("rs"), 2);
    })
    .constructor("addr", "[{rs} + {fn4}]", |c| {
        c.field("rs").field("fn4");
        let ptr = c.temp(2);
        c.op(OpCode::IntAdd, ptr.clone(), &[operand("rs"), operand("fn4")])
            .export_ptr("ram", ptr, 2);
    })
    .constructor("instruction", "LD {rd}, {src}", |c| {
        c.context_is("mode", 0)
            .is("op4", 3)
            .field("rd")
            .table("src", "addr")
            .copy(operand("rd"), operand("src"));
    })
    .constructor("instruction", "ST {rd}, {dst}", |c| {
        c.context_is("mode", 0)
            .is("op4", 4)
            .field("rd")
            .table("dst", "addr")
            .copy(operand("dst"), operand("rd"));
    })
}

fn branches(lang: SpecBuilder) -> SpecBuilder {
    lang.constructor("instruction", "JMP {target}", |c| {
        c.context_is("mode", 0)
            .is("op4", 5)
            .expr("target", Exp::inst_next() + Exp::field("simm12"))
            .goto(addr("ram", "target"));
    })
    .constructor("instruction", "BZ {target}", |c| {
        c.context_is("mode", 0)
            .is("op4", 6)
            .is("sub", 0)
            .expr("target", Exp::inst_next() + Exp::field("simm8"))
            .cbranch(addr("ram", "target"), reg("Z"));
    })
    .constructor("instruction", "BNZ {target}", |c| {
        c.context_is("mode", 0)
            .is("op4", 6)
            .is("sub", 1)
            .expr("target", Exp::inst_next() + Exp::field("simm8"));
        let nz = c.temp(1);
        c.op(OpCode::BoolNegate, nz.clone(), &[reg("Z")])
            .cbranch(addr("ram", "target"), nz);
    })
    .constructor("instruction", "CALL {abs16}", |c| {
        c.context_is("mode", 0)
            .is("op4", 7)
            .field_at("abs16", 2)
            .op(OpCode::IntSub, reg("sp"), &[reg("sp"), int(2, 2)])
            .store("ram", reg("sp"), next_address(2))
            .call(addr("ram", "abs16"));
    })
    .constructor("instruction", "RET", |c| {
        c.context_is("mode", 0).is("word", 0x8000);
        let ret = c.temp(2);
        c.load(ret.clone(), "ram", reg("sp"))
            .op(OpCode::IntAdd, reg("sp"), &[reg("sp"), int(2, 2)])
            .ret(ret);
    })
    .constructor("instruction", "JR {rs}", |c| {
        c.context_is("mode", 0)
            .is("op4", 8)
            .is("sub", 1)
            .field("rs")
            .effect(OpCode::BranchInd, &[operand("rs")]);
    })
}

fn compact(lang: SpecBuilder) -> SpecBuilder {
    lang.constructor("instruction", "NOP", |c| {
        c.context_is("mode", 1).is("b8", 0);
    })
    .constructor("instruction", "INC {creg}", |c| {
        c.context_is("mode", 1)
            .is("cop", 1)
            .field("creg")
            .op(OpCode::IntAdd, operand("creg"), &[operand("creg"), int(1, 2)]);
    })
    .constructor("instruction", "DEC {creg}", |c| {
        c.context_is("mode", 1)
            .is("cop", 2)
            .field("creg")
            .op(OpCode::IntSub, operand("creg"), &[operand("creg"), int(1, 2)]);
    })
    .constructor("instruction", "SETM 0", |c| {
        c.context_is("mode", 1)
            .is("b8", 0xe0)
            .commit_context("mode", Exp::int(0));
    })
}
