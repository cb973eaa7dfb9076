use alloc::{boxed::Box, string::String, vec::Vec};
use core::cmp;

use super::{model::*, LoadError, MAGIC, VERSION};
use crate::{bytes::Bytes, opcode::OpCode, space::SpaceKind};

const MAX_EXPR_DEPTH: usize = 64;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn bool(&mut self, value: bool) {
        self.u8(value as u8);
    }

    fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn len(&mut self, len: usize) {
        self.u32(len as u32);
    }

    fn str(&mut self, s: &str) {
        self.len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn opt_u32(&mut self, value: Option<u32>) {
        match value {
            Some(value) => {
                self.u8(1);
                self.u32(value);
            }
            None => self.u8(0),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Const(value) => {
                self.u8(0);
                self.u64(*value as u64);
            }
            Expr::Field(field) => {
                self.u8(1);
                self.u32(*field);
            }
            Expr::Context(field) => {
                self.u8(2);
                self.u32(*field);
            }
            Expr::InstStart => self.u8(3),
            Expr::InstNext => self.u8(4),
            Expr::Operand(index) => {
                self.u8(5);
                self.u32(*index);
            }
            Expr::Not(e) => {
                self.u8(6);
                self.expr(e);
            }
            Expr::Neg(e) => {
                self.u8(7);
                self.expr(e);
            }
            Expr::Binary(op, a, b) => {
                self.u8(8);
                self.u8(op.to_u8());
                self.expr(a);
                self.expr(b);
            }
        }
    }

    fn const_tpl(&mut self, c: &ConstTpl) {
        match c {
            ConstTpl::Real(value) => {
                self.u8(0);
                self.u64(*value);
            }
            ConstTpl::InstStart => self.u8(1),
            ConstTpl::InstNext => self.u8(2),
            ConstTpl::Label(label) => {
                self.u8(3);
                self.u32(*label);
            }
            ConstTpl::SpaceId(space) => {
                self.u8(4);
                self.u32(*space);
            }
            ConstTpl::Operand { index, part } => {
                self.u8(5);
                self.u32(*index);
                self.u8(match part {
                    OperandPart::Offset => 0,
                    OperandPart::Size => 1,
                    OperandPart::Space => 2,
                });
            }
        }
    }

    fn varnode_tpl(&mut self, vn: &VarnodeTpl) {
        match vn.space {
            SpaceTpl::Space(space) => {
                self.u8(0);
                self.u32(space);
            }
            SpaceTpl::Operand(index) => {
                self.u8(1);
                self.u32(index);
            }
        }
        self.const_tpl(&vn.offset);
        self.const_tpl(&vn.size);
    }

    fn display(&mut self, pieces: &[DisplayPiece]) {
        self.len(pieces.len());
        for piece in pieces {
            match piece {
                DisplayPiece::Text(text) => {
                    self.u8(0);
                    self.str(text);
                }
                DisplayPiece::Operand(index) => {
                    self.u8(1);
                    self.u32(*index);
                }
            }
        }
    }

    fn constructor(&mut self, ctor: &ConstructorDef) {
        let insn = &ctor.pattern.instruction;
        self.u32(insn.offset);
        self.len(insn.mask.len());
        self.buf.extend_from_slice(&insn.mask);
        self.buf.extend_from_slice(&insn.value);
        let ctx = &ctor.pattern.context;
        self.u32(ctx.offset);
        self.len(ctx.mask.len());
        ctx.mask.iter().for_each(|&i| self.u32(i));
        ctx.value.iter().for_each(|&i| self.u32(i));
        self.u32(ctor.length);

        self.len(ctor.operands.len());
        for operand in &ctor.operands {
            self.str(&operand.name);
            self.opt_u32(operand.offset.base);
            self.u32(operand.offset.rel);
            match &operand.kind {
                OperandKind::Field(field) => {
                    self.u8(0);
                    self.u32(*field);
                }
                OperandKind::Context(field) => {
                    self.u8(1);
                    self.u32(*field);
                }
                OperandKind::Table(table) => {
                    self.u8(2);
                    self.u32(*table);
                }
                OperandKind::Expr(expr) => {
                    self.u8(3);
                    self.expr(expr);
                }
            }
        }

        self.len(ctor.context_changes.len());
        for change in &ctor.context_changes {
            self.u32(change.field);
            self.expr(&change.value);
            self.bool(change.commit);
        }

        self.display(&ctor.mnemonic);
        self.display(&ctor.body);

        self.len(ctor.semantics.len());
        for stmt in &ctor.semantics {
            match stmt {
                Stmt::Op(op) => {
                    self.u8(0);
                    self.u32(op.opcode.into());
                    match &op.output {
                        Some(output) => {
                            self.u8(1);
                            self.varnode_tpl(output);
                        }
                        None => self.u8(0),
                    }
                    self.len(op.inputs.len());
                    op.inputs.iter().for_each(|i| self.varnode_tpl(i));
                }
                Stmt::Build(index) => {
                    self.u8(1);
                    self.u32(*index);
                }
                Stmt::Label(label) => {
                    self.u8(2);
                    self.u32(*label);
                }
            }
        }

        match &ctor.export {
            None => self.u8(0),
            Some(Export::Varnode(vn)) => {
                self.u8(1);
                self.varnode_tpl(vn);
            }
            Some(Export::Pointer {
                space,
                pointer,
                size,
            }) => {
                self.u8(2);
                self.u32(*space);
                self.varnode_tpl(pointer);
                self.u32(*size);
            }
        }
    }
}

pub(super) fn encode(sla: &Sla) -> Vec<u8> {
    let mut w = Writer { buf: Vec::new() };
    w.buf.extend_from_slice(&MAGIC);
    w.u16(VERSION);
    w.str(&sla.name);
    w.bool(sla.big_endian);
    w.u32(sla.alignment);
    w.u64(sla.unique_base);
    w.u32(sla.default_space);
    w.u32(sla.root);
    w.u32(sla.context_words);

    w.len(sla.spaces.len());
    for space in &sla.spaces {
        w.str(&space.name);
        w.u8(space.kind.to_u8());
        w.u32(space.address_size);
        w.u32(space.word_size);
        w.u32(space.flags);
        w.u64(space.pointer_lower_bound);
        w.u64(space.pointer_upper_bound);
        w.opt_u32(space.overlay_base);
    }

    w.len(sla.registers.len());
    for reg in &sla.registers {
        w.str(&reg.name);
        w.u32(reg.space);
        w.u64(reg.offset);
        w.u32(reg.size);
    }

    w.len(sla.tokens.len());
    for token in &sla.tokens {
        w.str(&token.name);
        w.u32(token.size);
        w.bool(token.big_endian);
    }

    w.len(sla.fields.len());
    for field in &sla.fields {
        w.str(&field.name);
        w.u32(field.token);
        w.u32(field.lsb);
        w.u32(field.msb);
        w.bool(field.signed);
        w.bool(field.hex);
        match &field.attach {
            Attach::None => w.u8(0),
            Attach::Registers(list) => {
                w.u8(1);
                w.len(list.len());
                list.iter().for_each(|&i| w.opt_u32(i));
            }
            Attach::Names(list) => {
                w.u8(2);
                w.len(list.len());
                for name in list {
                    match name {
                        Some(name) => {
                            w.u8(1);
                            w.str(name);
                        }
                        None => w.u8(0),
                    }
                }
            }
            Attach::Values(list) => {
                w.u8(3);
                w.len(list.len());
                for value in list {
                    match value {
                        Some(value) => {
                            w.u8(1);
                            w.u64(*value as u64);
                        }
                        None => w.u8(0),
                    }
                }
            }
        }
    }

    w.len(sla.context_fields.len());
    for field in &sla.context_fields {
        w.str(&field.name);
        w.u32(field.word);
        w.u32(field.lsb);
        w.u32(field.msb);
        w.bool(field.signed);
        w.bool(field.hex);
        w.u32(field.default);
    }

    w.len(sla.user_ops.len());
    sla.user_ops.iter().for_each(|i| w.str(i));

    w.len(sla.tables.len());
    for table in &sla.tables {
        w.str(&table.name);
        w.len(table.constructors.len());
        table.constructors.iter().for_each(|i| w.constructor(i));
    }

    w.buf
}

struct Reader<'a> {
    bytes: Bytes<'a>,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn offset(&self) -> usize {
        self.bytes.offset()
    }

    fn truncated(&self) -> LoadError {
        LoadError::Truncated(self.offset())
    }

    fn u8(&mut self) -> Result<u8, LoadError> {
        self.bytes.read_u8().map_err(|_| self.truncated())
    }

    fn bool(&mut self) -> Result<bool, LoadError> {
        let offset = self.offset();
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(LoadError::Tag(offset, tag)),
        }
    }

    fn u16(&mut self) -> Result<u16, LoadError> {
        self.bytes.read_u16().map_err(|_| self.truncated())
    }

    fn u32(&mut self) -> Result<u32, LoadError> {
        self.bytes.read_u32().map_err(|_| self.truncated())
    }

    fn u64(&mut self) -> Result<u64, LoadError> {
        self.bytes.read_u64().map_err(|_| self.truncated())
    }

    fn i64(&mut self) -> Result<i64, LoadError> {
        self.u64().map(|i| i as i64)
    }

    /// Reads an element count, bounded by the remaining input so that a
    /// corrupted count cannot force a huge allocation.
    fn len(&mut self) -> Result<usize, LoadError> {
        let len = self.u32()? as usize;
        if len > self.bytes.remaining() {
            return Err(LoadError::Truncated(self.offset()));
        }
        Ok(len)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], LoadError> {
        self.bytes.read(len).map_err(|_| self.truncated())
    }

    fn str(&mut self) -> Result<String, LoadError> {
        let len = self.len()?;
        let offset = self.offset();
        let raw = self.bytes(len)?;
        core::str::from_utf8(raw)
            .map(String::from)
            .map_err(|_| LoadError::Utf8(offset))
    }

    fn opt<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, LoadError>,
    ) -> Result<Option<T>, LoadError> {
        if self.bool()? {
            f(self).map(Some)
        } else {
            Ok(None)
        }
    }

    fn list<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T, LoadError>,
    ) -> Result<Vec<T>, LoadError> {
        let len = self.len()?;
        let mut list = Vec::with_capacity(cmp::min(len, 1024));
        for _ in 0..len {
            list.push(f(self)?);
        }
        Ok(list)
    }

    fn tag(&mut self) -> Result<(usize, u8), LoadError> {
        let offset = self.offset();
        self.u8().map(|tag| (offset, tag))
    }

    fn expr(&mut self) -> Result<Expr, LoadError> {
        let (offset, tag) = self.tag()?;
        if self.depth >= MAX_EXPR_DEPTH {
            return Err(LoadError::TooDeep(offset));
        }
        self.depth += 1;
        let expr = match tag {
            0 => Expr::Const(self.i64()?),
            1 => Expr::Field(self.u32()?),
            2 => Expr::Context(self.u32()?),
            3 => Expr::InstStart,
            4 => Expr::InstNext,
            5 => Expr::Operand(self.u32()?),
            6 => Expr::Not(Box::new(self.expr()?)),
            7 => Expr::Neg(Box::new(self.expr()?)),
            8 => {
                let (offset, op) = self.tag()?;
                let op = BinOp::from_u8(op).ok_or(LoadError::Tag(offset, op))?;
                let a = self.expr()?;
                let b = self.expr()?;
                Expr::binary(op, a, b)
            }
            _ => return Err(LoadError::Tag(offset, tag)),
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn const_tpl(&mut self) -> Result<ConstTpl, LoadError> {
        let (offset, tag) = self.tag()?;
        Ok(match tag {
            0 => ConstTpl::Real(self.u64()?),
            1 => ConstTpl::InstStart,
            2 => ConstTpl::InstNext,
            3 => ConstTpl::Label(self.u32()?),
            4 => ConstTpl::SpaceId(self.u32()?),
            5 => {
                let index = self.u32()?;
                let (offset, part) = self.tag()?;
                let part = match part {
                    0 => OperandPart::Offset,
                    1 => OperandPart::Size,
                    2 => OperandPart::Space,
                    _ => return Err(LoadError::Tag(offset, part)),
                };
                ConstTpl::Operand { index, part }
            }
            _ => return Err(LoadError::Tag(offset, tag)),
        })
    }

    fn varnode_tpl(&mut self) -> Result<VarnodeTpl, LoadError> {
        let (offset, tag) = self.tag()?;
        let space = match tag {
            0 => SpaceTpl::Space(self.u32()?),
            1 => SpaceTpl::Operand(self.u32()?),
            _ => return Err(LoadError::Tag(offset, tag)),
        };
        Ok(VarnodeTpl {
            space,
            offset: self.const_tpl()?,
            size: self.const_tpl()?,
        })
    }

    fn display(&mut self) -> Result<Vec<DisplayPiece>, LoadError> {
        self.list(|r| {
            let (offset, tag) = r.tag()?;
            Ok(match tag {
                0 => DisplayPiece::Text(r.str()?),
                1 => DisplayPiece::Operand(r.u32()?),
                _ => return Err(LoadError::Tag(offset, tag)),
            })
        })
    }

    fn stmt(&mut self) -> Result<Stmt, LoadError> {
        let (offset, tag) = self.tag()?;
        Ok(match tag {
            0 => {
                let offset = self.offset();
                let raw = self.u32()?;
                let opcode = OpCode::from_u32(raw)
                    .ok_or_else(|| LoadError::Invalid(alloc::format!("unknown opcode {raw} at offset {offset}")))?;
                let output = self.opt(|r| r.varnode_tpl())?;
                let inputs = self.list(|r| r.varnode_tpl())?;
                Stmt::Op(OpTpl {
                    opcode,
                    output,
                    inputs,
                })
            }
            1 => Stmt::Build(self.u32()?),
            2 => Stmt::Label(self.u32()?),
            _ => return Err(LoadError::Tag(offset, tag)),
        })
    }

    fn constructor(&mut self) -> Result<ConstructorDef, LoadError> {
        let offset = self.u32()?;
        let len = self.len()?;
        let mask = self.bytes(len)?.to_vec();
        let value = self.bytes(len)?.to_vec();
        let instruction = Block {
            offset,
            mask,
            value,
        };

        let offset = self.u32()?;
        let len = self.len()?;
        let mut mask = Vec::with_capacity(len);
        for _ in 0..len {
            mask.push(self.u32()?);
        }
        let mut value = Vec::with_capacity(len);
        for _ in 0..len {
            value.push(self.u32()?);
        }
        let context = Block {
            offset,
            mask,
            value,
        };

        let length = self.u32()?;

        let operands = self.list(|r| {
            let name = r.str()?;
            let base = r.opt(|r| r.u32())?;
            let rel = r.u32()?;
            let (offset, tag) = r.tag()?;
            let kind = match tag {
                0 => OperandKind::Field(r.u32()?),
                1 => OperandKind::Context(r.u32()?),
                2 => OperandKind::Table(r.u32()?),
                3 => OperandKind::Expr(r.expr()?),
                _ => return Err(LoadError::Tag(offset, tag)),
            };
            Ok(OperandDef {
                name,
                offset: OperandOffset { base, rel },
                kind,
            })
        })?;

        let context_changes = self.list(|r| {
            Ok(ContextChange {
                field: r.u32()?,
                value: r.expr()?,
                commit: r.bool()?,
            })
        })?;

        let mnemonic = self.display()?;
        let body = self.display()?;
        let semantics = self.list(|r| r.stmt())?;

        let (offset, tag) = self.tag()?;
        let export = match tag {
            0 => None,
            1 => Some(Export::Varnode(self.varnode_tpl()?)),
            2 => Some(Export::Pointer {
                space: self.u32()?,
                pointer: self.varnode_tpl()?,
                size: self.u32()?,
            }),
            _ => return Err(LoadError::Tag(offset, tag)),
        };

        Ok(ConstructorDef {
            pattern: Pattern {
                instruction,
                context,
            },
            length,
            operands,
            context_changes,
            mnemonic,
            body,
            semantics,
            export,
        })
    }

    fn attach(&mut self) -> Result<Attach, LoadError> {
        let (offset, tag) = self.tag()?;
        Ok(match tag {
            0 => Attach::None,
            1 => Attach::Registers(self.list(|r| r.opt(|r| r.u32()))?),
            2 => Attach::Names(self.list(|r| r.opt(|r| r.str()))?),
            3 => Attach::Values(self.list(|r| r.opt(|r| r.i64()))?),
            _ => return Err(LoadError::Tag(offset, tag)),
        })
    }
}

pub(super) fn decode(data: &[u8]) -> Result<Sla, LoadError> {
    let mut r = Reader {
        bytes: Bytes::new(data),
        depth: 0,
    };

    if r.bytes(MAGIC.len()).map_err(|_| LoadError::BadMagic)? != MAGIC {
        return Err(LoadError::BadMagic);
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(LoadError::Version(version));
    }

    let name = r.str()?;
    let big_endian = r.bool()?;
    let alignment = r.u32()?;
    let unique_base = r.u64()?;
    let default_space = r.u32()?;
    let root = r.u32()?;
    let context_words = r.u32()?;

    let spaces = r.list(|r| {
        let name = r.str()?;
        let (offset, tag) = r.tag()?;
        let kind = SpaceKind::from_u8(tag).ok_or(LoadError::Tag(offset, tag))?;
        Ok(SpaceDef {
            name,
            kind,
            address_size: r.u32()?,
            word_size: r.u32()?,
            flags: r.u32()?,
            pointer_lower_bound: r.u64()?,
            pointer_upper_bound: r.u64()?,
            overlay_base: r.opt(|r| r.u32())?,
        })
    })?;

    let registers = r.list(|r| {
        Ok(RegisterDef {
            name: r.str()?,
            space: r.u32()?,
            offset: r.u64()?,
            size: r.u32()?,
        })
    })?;

    let tokens = r.list(|r| {
        Ok(TokenDef {
            name: r.str()?,
            size: r.u32()?,
            big_endian: r.bool()?,
        })
    })?;

    let fields = r.list(|r| {
        Ok(FieldDef {
            name: r.str()?,
            token: r.u32()?,
            lsb: r.u32()?,
            msb: r.u32()?,
            signed: r.bool()?,
            hex: r.bool()?,
            attach: r.attach()?,
        })
    })?;

    let context_fields = r.list(|r| {
        Ok(ContextFieldDef {
            name: r.str()?,
            word: r.u32()?,
            lsb: r.u32()?,
            msb: r.u32()?,
            signed: r.bool()?,
            hex: r.bool()?,
            default: r.u32()?,
        })
    })?;

    let user_ops = r.list(|r| r.str())?;

    let tables = r.list(|r| {
        Ok(TableDef {
            name: r.str()?,
            constructors: r.list(|r| r.constructor())?,
        })
    })?;

    if r.bytes.remaining() != 0 {
        return Err(LoadError::Trailing(r.offset()));
    }

    Ok(Sla {
        name,
        big_endian,
        alignment,
        unique_base,
        default_space,
        root,
        context_words,
        spaces,
        registers,
        tokens,
        fields,
        context_fields,
        user_ops,
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sla {
        let mut sla = Sla {
            name: "sample".into(),
            big_endian: true,
            alignment: 1,
            unique_base: 0x100,
            default_space: 1,
            root: 0,
            context_words: 1,
            ..Sla::default()
        };
        sla.spaces.push(SpaceDef {
            name: "const".into(),
            kind: SpaceKind::Constant,
            address_size: 8,
            word_size: 1,
            flags: 0,
            pointer_lower_bound: 0,
            pointer_upper_bound: 0,
            overlay_base: None,
        });
        sla.fields.push(FieldDef {
            name: "op".into(),
            token: 0,
            lsb: 0,
            msb: 7,
            signed: false,
            hex: true,
            attach: Attach::Names(vec![Some("a".into()), None]),
        });
        sla.tables.push(TableDef {
            name: "instruction".into(),
            constructors: vec![ConstructorDef {
                operands: vec![OperandDef {
                    name: "target".into(),
                    offset: OperandOffset::default(),
                    kind: OperandKind::Expr(Expr::InstNext + Expr::Const(-2)),
                }],
                export: Some(Export::Pointer {
                    space: 1,
                    pointer: VarnodeTpl::operand(0),
                    size: 2,
                }),
                ..ConstructorDef::default()
            }],
        });
        sla
    }

    #[test]
    fn encode_decode() {
        let sla = sample();
        let bytes = encode(&sla);
        assert_eq!(decode(&bytes), Ok(sla));
    }

    #[test]
    fn truncated() {
        let bytes = encode(&sample());
        for len in [0, 3, 6, bytes.len() / 2, bytes.len() - 1] {
            assert!(decode(&bytes[..len]).is_err(), "len {len}");
        }
    }

    #[test]
    fn header() {
        let mut bytes = encode(&sample());
        bytes[0] = b'X';
        assert_eq!(decode(&bytes), Err(LoadError::BadMagic));

        let mut bytes = encode(&sample());
        bytes[4] = 9;
        assert_eq!(decode(&bytes), Err(LoadError::Version(9)));

        let mut bytes = encode(&sample());
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(LoadError::Trailing(_))));
    }

    #[test]
    fn deep_expression() {
        let mut expr = Expr::Const(0);
        for _ in 0..MAX_EXPR_DEPTH + 1 {
            expr = !expr;
        }
        let mut sla = sample();
        sla.tables[0].constructors[0].operands[0].kind = OperandKind::Expr(expr);
        let bytes = encode(&sla);
        assert!(matches!(decode(&bytes), Err(LoadError::TooDeep(_))));
    }
}
