//! P-code generation from semantic templates.

use alloc::{sync::Arc, vec, vec::Vec};

use pcode_core::{
    sla::{ConstTpl, Export, OpTpl, OperandKind, OperandPart, SpaceTpl, Stmt, VarnodeTpl},
    utils::truncate,
    AddressSpace, OpCode, PcodeOp, Varnode,
};

use crate::{
    language::{align_temp, Language},
    matcher::{Decoded, Node, Value},
};

/// Size of the constant naming a space in LOAD and STORE.
const SPACE_ID_SIZE: i32 = 8;

/// Value a constructor hands to its parent.
#[derive(Clone, Debug)]
enum Handle {
    Varnode(Varnode),
    /// `*[space]:size pointer`
    Pointer {
        space: Arc<AddressSpace>,
        pointer: Varnode,
        size: u32,
    },
}

impl Handle {
    fn part(&self, part: OperandPart) -> u64 {
        match (self, part) {
            (Handle::Varnode(vn), OperandPart::Offset) => vn.offset,
            (Handle::Varnode(vn), OperandPart::Size) => vn.size as u64,
            (Handle::Varnode(vn), OperandPart::Space) => vn.space.index as u64,
            (Handle::Pointer { pointer, .. }, OperandPart::Offset) => pointer.offset,
            (Handle::Pointer { size, .. }, OperandPart::Size) => *size as u64,
            (Handle::Pointer { space, .. }, OperandPart::Space) => space.index as u64,
        }
    }

    fn space(&self) -> &Arc<AddressSpace> {
        match self {
            Handle::Varnode(vn) => &vn.space,
            Handle::Pointer { space, .. } => space,
        }
    }
}

struct Fixup {
    op: usize,
    input: usize,
    label: u32,
}

/// Per constructor instance state.
struct Frame {
    handles: Vec<Option<Handle>>,
    /// Relocation base of the constructor's temporaries.
    temps: u64,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

/// Emits the ops of the instructions of one translate call.
///
/// Temporaries are numbered from a counter owned by the emitter, so the
/// temporaries of two instructions never alias.
pub(crate) struct Emitter<'a> {
    lang: &'a Language,
    next_temp: u64,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(lang: &'a Language) -> Self {
        Self {
            lang,
            next_temp: lang.sla().unique_base,
        }
    }

    pub(crate) fn emit(&mut self, insn: &Decoded, ops: &mut Vec<PcodeOp>) {
        self.build(insn, 0, ops);
    }

    fn alloc_temp(&mut self, size: u32) -> Varnode {
        let offset = self.next_temp;
        self.next_temp = self.next_temp.wrapping_add(align_temp(size as u64));
        Varnode::new(self.lang.spaces().unique().clone(), offset, size as i32)
    }

    fn constant(&self, value: u64, size: i32) -> Varnode {
        self.lang.spaces().constant_varnode(value, size)
    }

    fn operand_handle(&self, node: &Node, index: usize) -> Option<Handle> {
        let sla = self.lang.sla();
        let spaces = self.lang.spaces();
        let ctor = self.lang.constructor(node.table, node.ctor);
        let operand = node.operands.get(index)?;
        if let OperandKind::Field(field) = ctor.operands[index].kind {
            if let pcode_core::sla::Attach::Registers(list) = &sla.fields[field as usize].attach {
                let reg = list.get(operand.raw() as usize).copied().flatten()?;
                return self
                    .lang
                    .registers()
                    .get(reg as usize)
                    .map(|i| Handle::Varnode(i.varnode.clone()));
            }
        }
        let size = spaces.default_space().address_size;
        let value = truncate(operand.value() as u64, size);
        Some(Handle::Varnode(self.constant(value, size as i32)))
    }

    /// Emit the semantics of node `index`, returning its export.
    fn build(&mut self, insn: &Decoded, index: usize, ops: &mut Vec<PcodeOp>) -> Option<Handle> {
        let node = &insn.nodes[index];
        let ctor = self.lang.constructor(node.table, node.ctor);

        let temps = self.next_temp;
        self.next_temp = self
            .next_temp
            .wrapping_add(self.lang.temp_span(node.table, node.ctor));

        let handles = (0..node.operands.len())
            .map(|k| match node.operands[k].value {
                Value::Node(_) => None,
                Value::Int { .. } => self.operand_handle(node, k),
            })
            .collect();

        let labels = ctor
            .semantics
            .iter()
            .filter(|i| matches!(i, Stmt::Label(_)))
            .count();

        let mut frame = Frame {
            handles,
            temps,
            labels: vec![None; labels],
            fixups: Vec::new(),
        };

        // sub-tables without an explicit build are built first
        for (k, operand) in node.operands.iter().enumerate() {
            let explicit = ctor.semantics.iter().any(|i| *i == Stmt::Build(k as u32));
            if let (Value::Node(child), false) = (&operand.value, explicit) {
                frame.handles[k] = self.build(insn, *child, ops);
            }
        }

        for stmt in &ctor.semantics {
            match stmt {
                Stmt::Build(k) => {
                    if let Some(Value::Node(child)) = node.operands.get(*k as usize).map(|i| &i.value) {
                        frame.handles[*k as usize] = self.build(insn, *child, ops);
                    }
                }
                Stmt::Label(label) => {
                    if let Some(slot) = frame.labels.get_mut(*label as usize) {
                        *slot = Some(ops.len());
                    }
                }
                Stmt::Op(op) => self.emit_op(insn, &mut frame, op, ops),
            }
        }

        for fixup in &frame.fixups {
            let target = match frame.labels.get(fixup.label as usize) {
                Some(Some(target)) => *target,
                _ => continue,
            };
            let distance = (target as i64).wrapping_sub(fixup.op as i64) as u64;
            if let Some(vn) = ops.get_mut(fixup.op).and_then(|op| op.inputs.get_mut(fixup.input)) {
                vn.offset = truncate(distance, vn.size.max(0) as u32);
            }
        }

        match &ctor.export {
            Some(Export::Varnode(tpl)) => {
                if let Some(k) = whole_handle(tpl) {
                    return frame.handles.get(k as usize).cloned().flatten();
                }
                let vn = self.varnode(insn, &frame, tpl, ops);
                Some(Handle::Varnode(vn))
            }
            Some(Export::Pointer {
                space,
                pointer,
                size,
            }) => {
                let pointer = self.varnode(insn, &frame, pointer, ops);
                let space = self.lang.spaces().get(*space as usize)?.clone();
                Some(Handle::Pointer {
                    space,
                    pointer,
                    size: *size,
                })
            }
            None => None,
        }
    }

    fn emit_op(&mut self, insn: &Decoded, frame: &mut Frame, tpl: &OpTpl, ops: &mut Vec<PcodeOp>) {
        let mut inputs = Vec::with_capacity(tpl.inputs.len());
        let mut labels = Vec::new();
        for (i, input) in tpl.inputs.iter().enumerate() {
            if let ConstTpl::Label(label) = input.offset {
                labels.push((i, label));
            }
            inputs.push(self.varnode(insn, frame, input, ops));
        }

        let mut store = None;
        let output = match &tpl.output {
            Some(out) => Some(match dynamic(frame, out) {
                Some((space, pointer, size)) => {
                    let size = match out.size {
                        ConstTpl::Operand { part: OperandPart::Size, .. } => size,
                        ref other => self.const_value(insn, frame, other) as u32,
                    };
                    let tmp = self.alloc_temp(size);
                    store = Some((space, pointer, tmp.clone()));
                    tmp
                }
                None => self.plain_varnode(insn, frame, out),
            }),
            None => None,
        };

        let index = ops.len();
        for (input, label) in labels {
            frame.fixups.push(Fixup {
                op: index,
                input,
                label,
            });
        }
        ops.push(PcodeOp::new(tpl.opcode, output, inputs));

        if let Some((space, pointer, value)) = store {
            let id = self.constant(space.index as u64, SPACE_ID_SIZE);
            ops.push(PcodeOp::new(OpCode::Store, None, vec![id, pointer, value]));
        }
    }

    fn const_value(&self, insn: &Decoded, frame: &Frame, c: &ConstTpl) -> u64 {
        match *c {
            ConstTpl::Real(value) => value,
            ConstTpl::InstStart => insn.address,
            ConstTpl::InstNext => insn.inst_next(),
            // patched once the constructor is complete
            ConstTpl::Label(_) => 0,
            ConstTpl::SpaceId(space) => space as u64,
            ConstTpl::Operand { index, part } => frame
                .handles
                .get(index as usize)
                .and_then(|i| i.as_ref())
                .map_or(0, |i| i.part(part)),
        }
    }

    /// Input varnode, a dynamic handle is read with a LOAD first.
    fn varnode(&mut self, insn: &Decoded, frame: &Frame, tpl: &VarnodeTpl, ops: &mut Vec<PcodeOp>) -> Varnode {
        match dynamic(frame, tpl) {
            Some((space, pointer, size)) => {
                let size = match tpl.size {
                    ConstTpl::Operand { part: OperandPart::Size, .. } => size,
                    ref other => self.const_value(insn, frame, other) as u32,
                };
                let tmp = self.alloc_temp(size);
                let id = self.constant(space.index as u64, SPACE_ID_SIZE);
                ops.push(PcodeOp::new(OpCode::Load, Some(tmp.clone()), vec![id, pointer]));
                tmp
            }
            None => self.plain_varnode(insn, frame, tpl),
        }
    }

    fn plain_varnode(&self, insn: &Decoded, frame: &Frame, tpl: &VarnodeTpl) -> Varnode {
        let spaces = self.lang.spaces();
        let space = match tpl.space {
            SpaceTpl::Space(space) => spaces.get(space as usize),
            SpaceTpl::Operand(k) => frame
                .handles
                .get(k as usize)
                .and_then(|i| i.as_ref())
                .map(|i| i.space()),
        }
        .unwrap_or_else(|| spaces.constant())
        .clone();

        let size = self.const_value(insn, frame, &tpl.size) as i32;
        let mut offset = self.const_value(insn, frame, &tpl.offset);
        if space.is_constant() {
            if size > 0 {
                offset = truncate(offset, size as u32);
            }
        } else if space.is_unique() && matches!(tpl.space, SpaceTpl::Space(_)) {
            offset = frame.temps.wrapping_add(offset);
        } else {
            offset = space.wrap_offset(offset);
        }
        Varnode::new(space, offset, size)
    }
}

/// Operand index if the template is the whole handle of an operand.
fn whole_handle(tpl: &VarnodeTpl) -> Option<u32> {
    let k = tpl.is_operand_handle()?;
    match tpl.size {
        ConstTpl::Operand {
            index,
            part: OperandPart::Size,
        } if index == k => Some(k),
        _ => None,
    }
}

/// Pointer behind a template that names a dynamic handle.
fn dynamic(frame: &Frame, tpl: &VarnodeTpl) -> Option<(Arc<AddressSpace>, Varnode, u32)> {
    let k = tpl.is_operand_handle()?;
    match frame.handles.get(k as usize)? {
        Some(Handle::Pointer {
            space,
            pointer,
            size,
        }) => Some((space.clone(), pointer.clone(), *size)),
        _ => None,
    }
}
