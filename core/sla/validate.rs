use alloc::{format, string::String, vec, vec::Vec};

use super::model::*;
use crate::{opcode::Output, space::SpaceKind};

type Result<T = ()> = core::result::Result<T, String>;

macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(format!($($arg)+));
        }
    };
}

struct Scope<'a> {
    sla: &'a Sla,
    table: &'a TableDef,
    index: usize,
    ctor: &'a ConstructorDef,
}

impl Scope<'_> {
    fn err(&self, msg: impl core::fmt::Display) -> String {
        format!("{}[{}]: {msg}", self.table.name, self.index)
    }

    fn check(&self, cond: bool, msg: impl core::fmt::Display) -> Result {
        if cond {
            Ok(())
        } else {
            Err(self.err(msg))
        }
    }

    fn is_constant(&self, vn: &VarnodeTpl) -> bool {
        match vn.space {
            SpaceTpl::Space(space) => self
                .sla
                .spaces
                .get(space as usize)
                .map_or(false, |i| i.kind == SpaceKind::Constant),
            SpaceTpl::Operand(_) => false,
        }
    }

    fn operand(&self, index: u32) -> Result<&OperandDef> {
        self.ctor
            .operands
            .get(index as usize)
            .ok_or_else(|| self.err(format_args!("operand {index} out of range")))
    }

    fn expr(&self, expr: &Expr, owner: Option<usize>) -> Result {
        let mut result = Ok(());
        expr.walk(&mut |e| {
            if result.is_err() {
                return;
            }
            result = match *e {
                Expr::Field(field) => match self.sla.fields.get(field as usize) {
                    Some(def) => {
                        let size = self.sla.tokens[def.token as usize].size;
                        self.check(
                            size <= self.ctor.length,
                            format_args!("field {} read beyond constructor length", def.name),
                        )
                    }
                    None => Err(self.err(format_args!("field {field} out of range"))),
                },
                Expr::Context(field) => self.check(
                    (field as usize) < self.sla.context_fields.len(),
                    format_args!("context field {field} out of range"),
                ),
                Expr::Operand(index) => match self.operand(index) {
                    Ok(operand) => match (&operand.kind, owner) {
                        (OperandKind::Table(_), _) => {
                            Err(self.err("expression refers to a sub-table operand"))
                        }
                        (OperandKind::Expr(_), Some(owner)) if index as usize >= owner => {
                            Err(self.err("expression refers to a later expression operand"))
                        }
                        (_, None) => Err(self.err("context change refers to an operand")),
                        _ => Ok(()),
                    },
                    Err(err) => Err(err),
                },
                _ => Ok(()),
            };
        });
        result
    }

    fn const_tpl(&self, c: &ConstTpl, labels: usize) -> Result {
        match *c {
            ConstTpl::Label(label) => self.check(
                (label as usize) < labels,
                format_args!("label {label} is not placed"),
            ),
            ConstTpl::SpaceId(space) => self.check(
                (space as usize) < self.sla.spaces.len(),
                format_args!("space {space} out of range"),
            ),
            ConstTpl::Operand { index, .. } => self.operand(index).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn varnode(&self, vn: &VarnodeTpl, labels: usize) -> Result {
        match vn.space {
            SpaceTpl::Space(space) => self.check(
                (space as usize) < self.sla.spaces.len(),
                format_args!("space {space} out of range"),
            )?,
            SpaceTpl::Operand(index) => {
                self.operand(index)?;
            }
        }
        self.const_tpl(&vn.offset, labels)?;
        self.const_tpl(&vn.size, labels)?;
        for index in vn.operands() {
            if let OperandKind::Table(table) = self.operand(index)?.kind {
                let exports = self.sla.tables[table as usize]
                    .constructors
                    .iter()
                    .all(|i| i.export.is_some());
                self.check(
                    exports,
                    format_args!("sub-table {} has constructors without export", self.sla.tables[table as usize].name),
                )?;
            }
        }
        Ok(())
    }

    fn semantics(&self) -> Result {
        let ctor = self.ctor;

        let mut labels = Vec::new();
        for stmt in &ctor.semantics {
            if let Stmt::Label(label) = *stmt {
                let label = label as usize;
                if labels.len() <= label {
                    labels.resize(label + 1, false);
                }
                self.check(!labels[label], format_args!("label {label} placed twice"))?;
                labels[label] = true;
            }
        }
        self.check(
            labels.iter().all(|i| *i),
            "label ids are not contiguous",
        )?;
        let labels = labels.len();

        let mut built = vec![false; ctor.operands.len()];
        let mut used = vec![false; ctor.operands.len()];
        for stmt in &ctor.semantics {
            match stmt {
                Stmt::Op(op) => {
                    let name = op.opcode.name();
                    let arity = op.opcode.arity();
                    self.check(
                        arity.accepts(op.inputs.len()),
                        format_args!("{name} does not accept {} inputs", op.inputs.len()),
                    )?;
                    match (arity.output, &op.output) {
                        (Output::Required, None) => {
                            return Err(self.err(format_args!("{name} requires an output")));
                        }
                        (Output::None, Some(_)) => {
                            return Err(self.err(format_args!("{name} has no output")));
                        }
                        _ => {}
                    }
                    if op.opcode.is_boolean_output() {
                        if let Some(ConstTpl::Real(size)) = op.output.as_ref().map(|i| &i.size) {
                            self.check(*size == 1, format_args!("{name} output must be 1 byte"))?;
                        }
                    }
                    if op.opcode.is_same_size() {
                        let mut sizes = op
                            .output
                            .iter()
                            .chain(op.inputs.iter())
                            .filter(|i| !self.is_constant(i))
                            .filter_map(|i| match i.size {
                                ConstTpl::Real(size) => Some(size),
                                _ => None,
                            });
                        if let Some(first) = sizes.next() {
                            self.check(
                                sizes.all(|i| i == first),
                                format_args!("{name} operands differ in size"),
                            )?;
                        }
                    }
                    for vn in op.output.iter().chain(op.inputs.iter()) {
                        self.varnode(vn, labels)?;
                        for index in vn.operands() {
                            used[index as usize] = true;
                        }
                    }
                }
                Stmt::Build(index) => {
                    let index = *index as usize;
                    let operand = self.operand(index as u32)?;
                    self.check(
                        matches!(operand.kind, OperandKind::Table(_)),
                        format_args!("build of non sub-table operand {}", operand.name),
                    )?;
                    self.check(!built[index], format_args!("operand {} built twice", operand.name))?;
                    self.check(
                        !used[index],
                        format_args!("operand {} used before it is built", operand.name),
                    )?;
                    built[index] = true;
                }
                Stmt::Label(_) => {}
            }
        }

        match &ctor.export {
            Some(Export::Varnode(vn)) => self.varnode(vn, labels)?,
            Some(Export::Pointer {
                space,
                pointer,
                size,
            }) => {
                self.check(
                    (*space as usize) < self.sla.spaces.len(),
                    format_args!("export space {space} out of range"),
                )?;
                self.check(*size != 0, "export of zero size")?;
                self.varnode(pointer, labels)?;
            }
            None => {}
        }

        Ok(())
    }

    fn validate(&self) -> Result {
        let sla = self.sla;
        let ctor = self.ctor;

        let insn = &ctor.pattern.instruction;
        self.check(insn.mask.len() == insn.value.len(), "pattern mask and value differ in length")?;
        self.check(
            insn.mask.iter().zip(&insn.value).all(|(m, v)| v & !m == 0),
            "pattern value has bits outside its mask",
        )?;
        self.check(insn.end() <= ctor.length, "pattern is longer than the constructor")?;
        let ctx = &ctor.pattern.context;
        self.check(ctx.mask.len() == ctx.value.len(), "context mask and value differ in length")?;
        self.check(
            ctx.offset as usize + ctx.mask.len() <= sla.context_words as usize,
            "context pattern out of range",
        )?;
        self.check(
            ctx.mask.iter().zip(&ctx.value).all(|(m, v)| v & !m == 0),
            "context value has bits outside its mask",
        )?;

        for (i, operand) in ctor.operands.iter().enumerate() {
            if let Some(base) = operand.offset.base {
                self.check(
                    (base as usize) < i,
                    format_args!("operand {} is placed after a later operand", operand.name),
                )?;
            }
            match &operand.kind {
                OperandKind::Field(field) => self.check(
                    (*field as usize) < sla.fields.len(),
                    format_args!("field {field} out of range"),
                )?,
                OperandKind::Context(field) => self.check(
                    (*field as usize) < sla.context_fields.len(),
                    format_args!("context field {field} out of range"),
                )?,
                OperandKind::Table(table) => self.check(
                    (*table as usize) < sla.tables.len(),
                    format_args!("table {table} out of range"),
                )?,
                OperandKind::Expr(expr) => self.expr(expr, Some(i))?,
            }
        }

        for change in &ctor.context_changes {
            self.check(
                (change.field as usize) < sla.context_fields.len(),
                format_args!("context field {} out of range", change.field),
            )?;
            self.check(
                !change.value.uses_inst_next(),
                "context change depends on the instruction length",
            )?;
            self.expr(&change.value, None)?;
        }

        for piece in ctor.mnemonic.iter().chain(&ctor.body) {
            if let DisplayPiece::Operand(index) = piece {
                self.operand(*index)?;
            }
        }

        self.semantics()
    }
}

fn unique_names<'a>(what: &str, names: impl Iterator<Item = &'a String>) -> Result {
    let mut seen: Vec<&String> = Vec::new();
    for name in names {
        ensure!(!name.is_empty(), "{what} with empty name");
        ensure!(!seen.contains(&name), "duplicate {what} {name}");
        seen.push(name);
    }
    Ok(())
}

pub(super) fn validate(sla: &Sla) -> Result {
    let kinds = |kind: SpaceKind| sla.spaces.iter().filter(|i| i.kind == kind).count();
    ensure!(kinds(SpaceKind::Constant) == 1, "exactly one constant space is required");
    ensure!(kinds(SpaceKind::Internal) == 1, "exactly one unique space is required");
    unique_names("space", sla.spaces.iter().map(|i| &i.name))?;
    for space in &sla.spaces {
        ensure!(space.address_size != 0 && space.address_size <= 8, "space {} has invalid address size", space.name);
        ensure!(space.word_size != 0, "space {} has zero word size", space.name);
        if let Some(base) = space.overlay_base {
            ensure!((base as usize) < sla.spaces.len(), "space {} overlays unknown space", space.name);
        }
    }
    match sla.spaces.get(sla.default_space as usize) {
        Some(space) => ensure!(space.kind == SpaceKind::Processor, "default space {} is not a processor space", space.name),
        None => return Err(format!("default space {} out of range", sla.default_space)),
    }

    unique_names("register", sla.registers.iter().map(|i| &i.name))?;
    for reg in &sla.registers {
        ensure!((reg.space as usize) < sla.spaces.len(), "register {} in unknown space", reg.name);
        ensure!(reg.size != 0, "register {} has zero size", reg.name);
    }

    for token in &sla.tokens {
        ensure!(token.size != 0 && token.size <= 8, "token {} has invalid size", token.name);
    }

    unique_names("field", sla.fields.iter().map(|i| &i.name))?;
    for field in &sla.fields {
        let token = sla
            .tokens
            .get(field.token as usize)
            .ok_or_else(|| format!("field {} uses unknown token", field.name))?;
        ensure!(field.lsb <= field.msb && field.msb < token.size * 8, "field {} out of token bounds", field.name);
        let entries = 1_u64.checked_shl(field.width()).unwrap_or(u64::MAX);
        let len = match &field.attach {
            Attach::None => 0,
            Attach::Registers(list) => {
                for reg in list.iter().flatten() {
                    ensure!((*reg as usize) < sla.registers.len(), "field {} attaches unknown register", field.name);
                }
                list.len()
            }
            Attach::Names(list) => list.len(),
            Attach::Values(list) => list.len(),
        };
        ensure!(len as u64 <= entries, "field {} has more attached entries than values", field.name);
    }

    unique_names("context field", sla.context_fields.iter().map(|i| &i.name))?;
    for field in &sla.context_fields {
        ensure!(field.word < sla.context_words, "context field {} out of range", field.name);
        ensure!(field.lsb <= field.msb && field.msb < 32, "context field {} has invalid bits", field.name);
        let width = field.msb - field.lsb + 1;
        ensure!(width == 32 || field.default >> width == 0, "context field {} default does not fit", field.name);
    }

    ensure!((sla.root as usize) < sla.tables.len(), "root table out of range");
    unique_names("table", sla.tables.iter().map(|i| &i.name))?;
    for table in &sla.tables {
        ensure!(!table.constructors.is_empty(), "table {} has no constructors", table.name);
        for (index, ctor) in table.constructors.iter().enumerate() {
            Scope {
                sla,
                table,
                index,
                ctor,
            }
            .validate()?;
        }
    }

    Ok(())
}
