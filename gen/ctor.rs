use std::collections::HashMap;

use pcode_core::{
    sla::{
        Block, ConstTpl, ConstructorDef, ContextChange, DisplayPiece, Export, Expr, OpTpl,
        OperandDef, OperandKind, OperandOffset, OperandPart, Pattern, Sla, SpaceTpl, Stmt,
        VarnodeTpl,
    },
    OpCode, SpaceKind,
};

use crate::{
    exp::Exp,
    val::{Addr, Label, Val},
};

const SPACE_ID_SIZE: u64 = 8;
const TEMP_STEP: u64 = 0x10;

#[derive(Clone, Debug)]
enum Place {
    Start(u32),
    After(String, u32),
}

#[derive(Clone, Debug)]
enum OperandDraft {
    Field(String),
    Context(String),
    Table(String),
    Expr(Exp),
}

#[derive(Clone, Debug)]
enum StmtDraft {
    Op(OpCode, Option<Val>, Vec<Val>),
    CallOther(String, Option<Val>, Vec<Val>),
    Build(String),
    Label(Label),
}

#[derive(Clone, Debug)]
enum ExportDraft {
    Val(Val),
    Pointer(String, Val, u32),
}

/// One constructor: encoding, operands, display and semantics.
///
/// Names are resolved when the language is finished, so tables may be
/// referenced before their constructors are declared.
#[derive(Clone, Debug)]
pub struct ConstructorBuilder {
    display: String,
    constraints: Vec<(u32, String, u64)>,
    context_constraints: Vec<(String, u32)>,
    operands: Vec<(String, Place, OperandDraft)>,
    changes: Vec<(String, Exp, bool)>,
    semantics: Vec<StmtDraft>,
    export: Option<ExportDraft>,
    length: Option<u32>,
    next_temp: u64,
    labels: u32,
}

impl ConstructorBuilder {
    pub(crate) fn new(display: &str) -> Self {
        Self {
            display: display.into(),
            constraints: Vec::new(),
            context_constraints: Vec::new(),
            operands: Vec::new(),
            changes: Vec::new(),
            semantics: Vec::new(),
            export: None,
            length: None,
            next_temp: 0,
            labels: 0,
        }
    }

    pub(crate) fn display(&self) -> &str {
        &self.display
    }

    /// Require `field`, read at the constructor start, to equal `value`.
    pub fn is(&mut self, field: &str, value: u64) -> &mut Self {
        self.is_at(0, field, value)
    }

    /// Require `field`, read `offset` bytes after the constructor start, to
    /// equal `value`.
    pub fn is_at(&mut self, offset: u32, field: &str, value: u64) -> &mut Self {
        self.constraints.push((offset, field.into(), value));
        self
    }

    pub fn context_is(&mut self, name: &str, value: u32) -> &mut Self {
        self.context_constraints.push((name.into(), value));
        self
    }

    fn operand(&mut self, name: &str, place: Place, kind: OperandDraft) -> &mut Self {
        self.operands.push((name.into(), place, kind));
        self
    }

    /// Operand named after `field`, read at the constructor start.
    pub fn field(&mut self, field: &str) -> &mut Self {
        self.field_at(field, 0)
    }

    pub fn field_at(&mut self, field: &str, offset: u32) -> &mut Self {
        self.operand(field, Place::Start(offset), OperandDraft::Field(field.into()))
    }

    /// Operand named after `field`, read right after operand `after`.
    pub fn field_after(&mut self, field: &str, after: &str) -> &mut Self {
        self.operand(
            field,
            Place::After(after.into(), 0),
            OperandDraft::Field(field.into()),
        )
    }

    /// Operand holding the value of a context variable.
    pub fn context(&mut self, name: &str) -> &mut Self {
        self.operand(name, Place::Start(0), OperandDraft::Context(name.into()))
    }

    /// Sub-table operand matched at the constructor start.
    pub fn table(&mut self, name: &str, table: &str) -> &mut Self {
        self.table_at(name, table, 0)
    }

    pub fn table_at(&mut self, name: &str, table: &str, offset: u32) -> &mut Self {
        self.operand(name, Place::Start(offset), OperandDraft::Table(table.into()))
    }

    pub fn table_after(&mut self, name: &str, table: &str, after: &str) -> &mut Self {
        self.operand(
            name,
            Place::After(after.into(), 0),
            OperandDraft::Table(table.into()),
        )
    }

    /// Operand computed from other operands once the instruction is decoded.
    pub fn expr(&mut self, name: &str, exp: Exp) -> &mut Self {
        self.operand(name, Place::Start(0), OperandDraft::Expr(exp))
    }

    /// Change a context variable for the rest of this instruction.
    pub fn set_context(&mut self, name: &str, exp: impl Into<Exp>) -> &mut Self {
        self.changes.push((name.into(), exp.into(), false));
        self
    }

    /// Change a context variable for this and the following instructions.
    pub fn commit_context(&mut self, name: &str, exp: impl Into<Exp>) -> &mut Self {
        self.changes.push((name.into(), exp.into(), true));
        self
    }

    /// Bytes covered by the constructor's own tokens, computed if not set.
    pub fn length(&mut self, length: u32) -> &mut Self {
        self.length = Some(length);
        self
    }

    /// A new temporary of `size` bytes.
    pub fn temp(&mut self, size: u32) -> Val {
        let offset = self.next_temp;
        self.next_temp += (size as u64 + TEMP_STEP - 1) / TEMP_STEP * TEMP_STEP;
        Val::Temp(offset, size)
    }

    pub fn label(&mut self) -> Label {
        let label = Label(self.labels);
        self.labels += 1;
        label
    }

    pub fn place(&mut self, label: Label) -> &mut Self {
        self.semantics.push(StmtDraft::Label(label));
        self
    }

    /// Emit the semantics of a sub-table operand at this point.
    pub fn build(&mut self, operand: &str) -> &mut Self {
        self.semantics.push(StmtDraft::Build(operand.into()));
        self
    }

    /// Operation writing `output`.
    pub fn op(&mut self, opcode: OpCode, output: Val, inputs: &[Val]) -> &mut Self {
        self.semantics
            .push(StmtDraft::Op(opcode, Some(output), inputs.to_vec()));
        self
    }

    /// Operation without an output.
    pub fn effect(&mut self, opcode: OpCode, inputs: &[Val]) -> &mut Self {
        self.semantics
            .push(StmtDraft::Op(opcode, None, inputs.to_vec()));
        self
    }

    pub fn copy(&mut self, dst: Val, src: Val) -> &mut Self {
        self.op(OpCode::Copy, dst, &[src])
    }

    pub fn load(&mut self, dst: Val, space: &str, pointer: Val) -> &mut Self {
        self.op(OpCode::Load, dst, &[crate::val::space_id(space), pointer])
    }

    pub fn store(&mut self, space: &str, pointer: Val, value: Val) -> &mut Self {
        self.effect(OpCode::Store, &[crate::val::space_id(space), pointer, value])
    }

    pub fn goto(&mut self, target: Val) -> &mut Self {
        self.effect(OpCode::Branch, &[target])
    }

    pub fn cbranch(&mut self, target: Val, cond: Val) -> &mut Self {
        self.effect(OpCode::CBranch, &[target, cond])
    }

    pub fn call(&mut self, target: Val) -> &mut Self {
        self.effect(OpCode::Call, &[target])
    }

    pub fn ret(&mut self, target: Val) -> &mut Self {
        self.effect(OpCode::Return, &[target])
    }

    /// Call the user-defined operation `name`.
    pub fn call_other(&mut self, name: &str, output: Option<Val>, args: &[Val]) -> &mut Self {
        self.semantics
            .push(StmtDraft::CallOther(name.into(), output, args.to_vec()));
        self
    }

    pub fn export(&mut self, value: Val) -> &mut Self {
        self.export = Some(ExportDraft::Val(value));
        self
    }

    /// Export `*[space]:size pointer`.
    pub fn export_ptr(&mut self, space: &str, pointer: Val, size: u32) -> &mut Self {
        self.export = Some(ExportDraft::Pointer(space.into(), pointer, size));
        self
    }

    pub(crate) fn resolve(&self, sla: &Sla, tables: &[String]) -> Result<ConstructorDef, String> {
        Resolver::new(self, sla, tables)?.resolve()
    }
}

fn find<'a, T>(list: &'a [T], name: &str, what: &str, key: impl Fn(&T) -> &str) -> Result<(u32, &'a T), String> {
    list.iter()
        .enumerate()
        .find(|(_, i)| key(i) == name)
        .map(|(i, t)| (i as u32, t))
        .ok_or_else(|| format!("unknown {what} {name}"))
}

struct Resolver<'a> {
    ctor: &'a ConstructorBuilder,
    sla: &'a Sla,
    tables: &'a [String],
    operands: HashMap<&'a str, u32>,
    constant: u32,
    unique: u32,
}

impl<'a> Resolver<'a> {
    fn new(ctor: &'a ConstructorBuilder, sla: &'a Sla, tables: &'a [String]) -> Result<Self, String> {
        let mut operands = HashMap::new();
        for (i, (name, ..)) in ctor.operands.iter().enumerate() {
            if operands.insert(name.as_str(), i as u32).is_some() {
                return Err(format!("duplicate operand {name}"));
            }
        }
        let space = |kind| sla.space_index(kind).ok_or("missing constant or unique space");
        Ok(Self {
            ctor,
            sla,
            tables,
            operands,
            constant: space(SpaceKind::Constant)?,
            unique: space(SpaceKind::Internal)?,
        })
    }

    fn operand(&self, name: &str) -> Result<u32, String> {
        self.operands
            .get(name)
            .copied()
            .ok_or_else(|| format!("unknown operand {name}"))
    }

    fn field(&self, name: &str) -> Result<u32, String> {
        find(&self.sla.fields, name, "field", |i| i.name.as_str()).map(|i| i.0)
    }

    fn context_field(&self, name: &str) -> Result<u32, String> {
        find(&self.sla.context_fields, name, "context variable", |i| i.name.as_str()).map(|i| i.0)
    }

    fn space(&self, name: &str) -> Result<u32, String> {
        find(&self.sla.spaces, name, "space", |i| i.name.as_str()).map(|i| i.0)
    }

    fn token_size(&self, field: u32) -> u32 {
        let token = self.sla.fields[field as usize].token;
        self.sla.tokens[token as usize].size
    }

    fn exp(&self, exp: &Exp) -> Result<Expr, String> {
        Ok(match exp {
            Exp::Int(value) => Expr::Const(*value),
            Exp::Field(name) => Expr::Field(self.field(name)?),
            Exp::Context(name) => Expr::Context(self.context_field(name)?),
            Exp::InstStart => Expr::InstStart,
            Exp::InstNext => Expr::InstNext,
            Exp::Operand(name) => Expr::Operand(self.operand(name)?),
            Exp::Not(e) => !self.exp(e)?,
            Exp::Neg(e) => -self.exp(e)?,
            Exp::Binary(op, a, b) => Expr::binary(*op, self.exp(a)?, self.exp(b)?),
        })
    }

    /// Largest token read at the constructor start by an expression.
    fn exp_extent(&self, exp: &Expr) -> u32 {
        let mut end = 0;
        exp.walk(&mut |e| {
            if let Expr::Field(field) = e {
                end = end.max(self.token_size(*field));
            }
        });
        end
    }

    fn val(&self, val: &Val) -> Result<VarnodeTpl, String> {
        let constant = |offset, size: u32| VarnodeTpl {
            space: SpaceTpl::Space(self.constant),
            offset,
            size: ConstTpl::Real(size as u64),
        };
        Ok(match val {
            Val::Reg(name) => {
                let (_, reg) = find(&self.sla.registers, name, "register", |i| i.name.as_str())?;
                VarnodeTpl {
                    space: SpaceTpl::Space(reg.space),
                    offset: ConstTpl::Real(reg.offset),
                    size: ConstTpl::Real(reg.size as u64),
                }
            }
            Val::Operand(name) => VarnodeTpl::operand(self.operand(name)?),
            Val::Sized(name, size) => {
                let index = self.operand(name)?;
                VarnodeTpl {
                    space: SpaceTpl::Operand(index),
                    offset: ConstTpl::Operand {
                        index,
                        part: OperandPart::Offset,
                    },
                    size: ConstTpl::Real(*size as u64),
                }
            }
            Val::Const(value, size) => constant(ConstTpl::Real(*value), *size),
            Val::Temp(offset, size) => VarnodeTpl {
                space: SpaceTpl::Space(self.unique),
                offset: ConstTpl::Real(*offset),
                size: ConstTpl::Real(*size as u64),
            },
            Val::Addr { space, addr, size } => {
                let index = self.space(space)?;
                let size = size.unwrap_or(self.sla.spaces[index as usize].address_size);
                let offset = match addr {
                    Addr::Operand(name) => ConstTpl::Operand {
                        index: self.operand(name)?,
                        part: OperandPart::Offset,
                    },
                    Addr::InstStart => ConstTpl::InstStart,
                    Addr::InstNext => ConstTpl::InstNext,
                };
                VarnodeTpl {
                    space: SpaceTpl::Space(index),
                    offset,
                    size: ConstTpl::Real(size as u64),
                }
            }
            Val::SpaceId(space) => VarnodeTpl {
                space: SpaceTpl::Space(self.constant),
                offset: ConstTpl::SpaceId(self.space(space)?),
                size: ConstTpl::Real(SPACE_ID_SIZE),
            },
            Val::Label(label, size) => {
                if label.0 >= self.ctor.labels {
                    return Err(format!("label {} is not declared", label.0));
                }
                constant(ConstTpl::Label(label.0), *size)
            }
        })
    }

    fn vals(&self, vals: &[Val]) -> Result<Vec<VarnodeTpl>, String> {
        vals.iter().map(|i| self.val(i)).collect()
    }

    fn display(&self) -> Result<(Vec<DisplayPiece>, Vec<DisplayPiece>), String> {
        let text = self.ctor.display.trim();
        let split = {
            let mut depth = 0;
            text.char_indices()
                .find(|&(_, c)| {
                    match c {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    depth == 0 && c.is_whitespace()
                })
                .map_or(text.len(), |(i, _)| i)
        };
        let mnemonic = self.pieces(&text[..split])?;
        let body = self.pieces(text[split..].trim())?;
        Ok((mnemonic, body))
    }

    fn pieces(&self, mut text: &str) -> Result<Vec<DisplayPiece>, String> {
        let mut pieces = Vec::new();
        while !text.is_empty() {
            match text.find('{') {
                Some(0) => {
                    let end = text
                        .find('}')
                        .ok_or_else(|| format!("unterminated placeholder in \"{}\"", self.ctor.display))?;
                    pieces.push(DisplayPiece::Operand(self.operand(&text[1..end])?));
                    text = &text[end + 1..];
                }
                Some(start) => {
                    pieces.push(DisplayPiece::Text(text[..start].into()));
                    text = &text[start..];
                }
                None => {
                    pieces.push(DisplayPiece::Text(text.into()));
                    text = "";
                }
            }
        }
        Ok(pieces)
    }

    fn pattern(&self) -> Result<(Pattern, u32), String> {
        let mut mask: Vec<u8> = Vec::new();
        let mut value: Vec<u8> = Vec::new();
        let mut extent = 0;
        for (offset, name, expected) in &self.ctor.constraints {
            let field = self.field(name)?;
            let def = &self.sla.fields[field as usize];
            let token = &self.sla.tokens[def.token as usize];
            if def.width() < 64 && expected >> def.width() != 0 {
                return Err(format!("value {expected:#x} does not fit field {name}"));
            }
            extent = extent.max(offset + token.size);
            for bit in def.lsb..=def.msb {
                let byte = if token.big_endian {
                    token.size - 1 - bit / 8
                } else {
                    bit / 8
                };
                let index = (offset + byte) as usize;
                if mask.len() <= index {
                    mask.resize(index + 1, 0);
                    value.resize(index + 1, 0);
                }
                let m = 1 << (bit % 8);
                let v = if expected >> (bit - def.lsb) & 1 != 0 { m } else { 0 };
                if mask[index] & m != 0 && value[index] & m != v {
                    return Err(format!("conflicting constraints on field {name}"));
                }
                mask[index] |= m;
                value[index] = value[index] & !m | v;
            }
        }
        let first = mask.iter().position(|i| *i != 0).unwrap_or(mask.len());
        let instruction = Block {
            offset: if first == mask.len() { 0 } else { first as u32 },
            mask: mask[first..].to_vec(),
            value: value[first..].to_vec(),
        };

        let mut cmask = vec![0_u32; self.sla.context_words as usize];
        let mut cvalue = cmask.clone();
        for (name, expected) in &self.ctor.context_constraints {
            let def = &self.sla.context_fields[self.context_field(name)? as usize];
            let width = def.msb - def.lsb + 1;
            if width < 32 && expected >> width != 0 {
                return Err(format!("value {expected:#x} does not fit context variable {name}"));
            }
            let m = if width == 32 { u32::MAX } else { ((1 << width) - 1) << def.lsb };
            let word = def.word as usize;
            if cmask[word] & m != 0 && cvalue[word] & m != (expected << def.lsb) & m {
                return Err(format!("conflicting constraints on context variable {name}"));
            }
            cmask[word] |= m;
            cvalue[word] = cvalue[word] & !m | (expected << def.lsb) & m;
        }
        let first = cmask.iter().position(|i| *i != 0).unwrap_or(cmask.len());
        let last = cmask.iter().rposition(|i| *i != 0).map_or(first, |i| i + 1);
        let context = Block {
            offset: if first == cmask.len() { 0 } else { first as u32 },
            mask: cmask[first..last].to_vec(),
            value: cvalue[first..last].to_vec(),
        };

        Ok((
            Pattern {
                instruction,
                context,
            },
            extent,
        ))
    }

    fn resolve(&self) -> Result<ConstructorDef, String> {
        let ctor = self.ctor;
        let (pattern, mut length) = self.pattern()?;

        let mut operands = Vec::with_capacity(ctor.operands.len());
        for (name, place, kind) in &ctor.operands {
            let offset = match place {
                Place::Start(rel) => OperandOffset { base: None, rel: *rel },
                Place::After(base, rel) => OperandOffset {
                    base: Some(self.operand(base)?),
                    rel: *rel,
                },
            };
            let kind = match kind {
                OperandDraft::Field(field) => {
                    let field = self.field(field)?;
                    if let Place::Start(rel) = place {
                        length = length.max(rel + self.token_size(field));
                    }
                    OperandKind::Field(field)
                }
                OperandDraft::Context(field) => OperandKind::Context(self.context_field(field)?),
                OperandDraft::Table(table) => {
                    let index = self
                        .tables
                        .iter()
                        .position(|i| i == table)
                        .ok_or_else(|| format!("unknown table {table}"))?;
                    OperandKind::Table(index as u32)
                }
                OperandDraft::Expr(exp) => {
                    let expr = self.exp(exp)?;
                    length = length.max(self.exp_extent(&expr));
                    OperandKind::Expr(expr)
                }
            };
            operands.push(OperandDef {
                name: name.clone(),
                offset,
                kind,
            });
        }

        let mut context_changes = Vec::with_capacity(ctor.changes.len());
        for (name, exp, commit) in &ctor.changes {
            let value = self.exp(exp)?;
            length = length.max(self.exp_extent(&value));
            context_changes.push(ContextChange {
                field: self.context_field(name)?,
                value,
                commit: *commit,
            });
        }

        let mut semantics = Vec::with_capacity(ctor.semantics.len());
        for stmt in &ctor.semantics {
            semantics.push(match stmt {
                StmtDraft::Op(opcode, output, inputs) => Stmt::Op(OpTpl {
                    opcode: *opcode,
                    output: output.as_ref().map(|i| self.val(i)).transpose()?,
                    inputs: self.vals(inputs)?,
                }),
                StmtDraft::CallOther(name, output, args) => {
                    let index = self
                        .sla
                        .user_ops
                        .iter()
                        .position(|i| i == name)
                        .ok_or_else(|| format!("unknown user op {name}"))?;
                    let mut inputs = vec![self.val(&Val::Const(index as u64, 4))?];
                    inputs.extend(self.vals(args)?);
                    Stmt::Op(OpTpl {
                        opcode: OpCode::CallOther,
                        output: output.as_ref().map(|i| self.val(i)).transpose()?,
                        inputs,
                    })
                }
                StmtDraft::Build(name) => Stmt::Build(self.operand(name)?),
                StmtDraft::Label(label) => Stmt::Label(label.0),
            });
        }

        let export = match &ctor.export {
            Some(ExportDraft::Val(val)) => Some(Export::Varnode(self.val(val)?)),
            Some(ExportDraft::Pointer(space, pointer, size)) => Some(Export::Pointer {
                space: self.space(space)?,
                pointer: self.val(pointer)?,
                size: *size,
            }),
            None => None,
        };

        let (mnemonic, body) = self.display()?;

        Ok(ConstructorDef {
            length: ctor.length.unwrap_or(length.max(pattern.instruction.end())),
            pattern,
            operands,
            context_changes,
            mnemonic,
            body,
            semantics,
            export,
        })
    }
}
