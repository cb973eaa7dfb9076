//! Mnemonic and operand text from display templates.

use alloc::string::String;
use core::fmt::Write;

use pcode_core::sla::{Attach, DisplayPiece, OperandKind};

use crate::{
    language::Language,
    matcher::{Decoded, Node, Operand, Value},
};

fn write_number(out: &mut String, value: i64, raw: u64, signed: bool, hex: bool) {
    let _ = match (signed && value < 0, hex) {
        (true, true) => write!(out, "-{:#x}", value.unsigned_abs()),
        (true, false) => write!(out, "{value}"),
        (false, true) => write!(out, "{raw:#x}"),
        (false, false) => write!(out, "{raw}"),
    };
}

struct Render<'a> {
    lang: &'a Language,
    insn: &'a Decoded,
}

impl Render<'_> {
    fn node(&self, index: usize) -> &Node {
        &self.insn.nodes[index]
    }

    fn operand(&self, out: &mut String, node: &Node, index: u32) {
        let sla = self.lang.sla();
        let ctor = self.lang.constructor(node.table, node.ctor);
        let (def, operand): (_, &Operand) =
            match (ctor.operands.get(index as usize), node.operands.get(index as usize)) {
                (Some(def), Some(operand)) => (def, operand),
                _ => return,
            };
        let raw = operand.raw();
        let value = operand.value();
        match &def.kind {
            OperandKind::Field(field) => {
                let field = &sla.fields[*field as usize];
                let entry = raw as usize;
                match &field.attach {
                    Attach::Registers(list) => {
                        let name = list
                            .get(entry)
                            .copied()
                            .flatten()
                            .and_then(|i| self.lang.registers().get(i as usize));
                        if let Some(reg) = name {
                            out.push_str(&reg.name);
                        }
                    }
                    Attach::Names(list) => {
                        if let Some(Some(name)) = list.get(entry) {
                            out.push_str(name);
                        }
                    }
                    Attach::Values(list) => {
                        if let Some(Some(value)) = list.get(entry) {
                            write_number(out, *value, *value as u64, true, field.hex);
                        }
                    }
                    Attach::None => write_number(out, value, raw, field.signed, field.hex),
                }
            }
            OperandKind::Context(field) => {
                let field = &sla.context_fields[*field as usize];
                write_number(out, value, raw, field.signed, field.hex);
            }
            OperandKind::Expr(_) => write_number(out, value, raw, true, true),
            OperandKind::Table(_) => {
                if let Value::Node(child) = operand.value {
                    let (mnemonic, body) = self.text(child);
                    out.push_str(&mnemonic);
                    if !mnemonic.is_empty() && !body.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&body);
                }
            }
        }
    }

    fn pieces(&self, node: &Node, pieces: &[DisplayPiece]) -> String {
        let mut out = String::new();
        for piece in pieces {
            match piece {
                DisplayPiece::Text(text) => out.push_str(text),
                DisplayPiece::Operand(index) => self.operand(&mut out, node, *index),
            }
        }
        String::from(out.trim())
    }

    /// Mnemonic and body of node `index`, following delegating constructors.
    fn text(&self, mut index: usize) -> (String, String) {
        loop {
            let node = self.node(index);
            let ctor = self.lang.constructor(node.table, node.ctor);
            if let Some(k) = ctor.delegate() {
                if let Some(Value::Node(child)) = node.operands.get(k as usize).map(|i| &i.value) {
                    index = *child;
                    continue;
                }
            }
            return (self.pieces(node, &ctor.mnemonic), self.pieces(node, &ctor.body));
        }
    }
}

/// Mnemonic and operand text of a decoded instruction.
pub(crate) fn render(lang: &Language, insn: &Decoded) -> (String, String) {
    Render { lang, insn }.text(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(value: i64, signed: bool, hex: bool) -> String {
        let mut out = String::new();
        write_number(&mut out, value, value as u64, signed, hex);
        out
    }

    #[test]
    fn numbers() {
        assert_eq!(number(-4, true, true), "-0x4");
        assert_eq!(number(-4, true, false), "-4");
        assert_eq!(number(26, false, true), "0x1a");
        assert_eq!(number(26, true, false), "26");
    }
}
