//! Per-table binary decision trees.
//!
//! A tree only prunes the candidate list, the matcher still checks every
//! remaining candidate against its full pattern. Candidates keep their
//! priority order in every node.

use alloc::{boxed::Box, collections::BTreeSet, vec::Vec};

use pcode_core::sla::{ConstructorDef, Pattern};

use crate::context::ContextState;

const MAX_TREE_DEPTH: usize = 24;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Bit {
    Insn { byte: u32, bit: u8 },
    Context { word: u32, bit: u8 },
}

impl Bit {
    /// Required value of the bit, `None` if the pattern does not care.
    fn constraint(self, pattern: &Pattern) -> Option<bool> {
        match self {
            Bit::Insn { byte, bit } => {
                let block = &pattern.instruction;
                let i = byte.checked_sub(block.offset)? as usize;
                let mask = *block.mask.get(i)?;
                (mask >> bit & 1 != 0).then(|| block.value[i] >> bit & 1 != 0)
            }
            Bit::Context { word, bit } => {
                let block = &pattern.context;
                let i = word.checked_sub(block.offset)? as usize;
                let mask = *block.mask.get(i)?;
                (mask >> bit & 1 != 0).then(|| block.value[i] >> bit & 1 != 0)
            }
        }
    }

    /// Value of the bit, `None` if the byte is not available.
    fn read(self, data: &[u8], start: usize, context: &ContextState) -> Option<bool> {
        match self {
            Bit::Insn { byte, bit } => {
                let b = *data.get(start + byte as usize)?;
                Some(b >> bit & 1 != 0)
            }
            Bit::Context { word, bit } => Some(context.word(word as usize) >> bit & 1 != 0),
        }
    }
}

fn pattern_bits(pattern: &Pattern, out: &mut BTreeSet<Bit>) {
    let insn = &pattern.instruction;
    for (i, mask) in insn.mask.iter().enumerate() {
        for bit in (0..8).filter(|b| mask >> b & 1 != 0) {
            out.insert(Bit::Insn {
                byte: insn.offset + i as u32,
                bit,
            });
        }
    }
    let ctx = &pattern.context;
    for (i, mask) in ctx.mask.iter().enumerate() {
        for bit in (0..32).filter(|b| mask >> b & 1 != 0) {
            out.insert(Bit::Context {
                word: ctx.offset + i as u32,
                bit,
            });
        }
    }
}

#[derive(Debug)]
pub(crate) enum Tree {
    Leaf(Vec<u32>),
    Node {
        bit: Bit,
        /// Every candidate of the node, used when the bit cannot be read.
        all: Vec<u32>,
        zero: Box<Tree>,
        one: Box<Tree>,
    },
}

impl Tree {
    /// `order` lists constructor indices by priority.
    pub(crate) fn build(ctors: &[ConstructorDef], order: &[u32]) -> Self {
        Self::build_node(ctors, order.to_vec(), 0)
    }

    fn build_node(ctors: &[ConstructorDef], cands: Vec<u32>, depth: usize) -> Self {
        if cands.len() <= 1 || depth >= MAX_TREE_DEPTH {
            return Tree::Leaf(cands);
        }

        let pattern = |i: u32| &ctors[i as usize].pattern;

        let mut bits = BTreeSet::new();
        for &i in &cands {
            pattern_bits(pattern(i), &mut bits);
        }

        let mut best: Option<(usize, Bit)> = None;
        for bit in bits {
            let mut zero = 0;
            let mut one = 0;
            for &i in &cands {
                match bit.constraint(pattern(i)) {
                    Some(false) => zero += 1,
                    Some(true) => one += 1,
                    None => {
                        zero += 1;
                        one += 1;
                    }
                }
            }
            let score = zero.max(one);
            if score < cands.len() && best.map_or(true, |(s, _)| score < s) {
                best = Some((score, bit));
            }
        }

        let bit = match best {
            Some((_, bit)) => bit,
            None => return Tree::Leaf(cands),
        };

        let side = |value: bool| -> Vec<u32> {
            cands
                .iter()
                .copied()
                .filter(|&i| bit.constraint(pattern(i)) != Some(!value))
                .collect()
        };
        let zero = Box::new(Self::build_node(ctors, side(false), depth + 1));
        let one = Box::new(Self::build_node(ctors, side(true), depth + 1));

        Tree::Node {
            bit,
            all: cands,
            zero,
            one,
        }
    }

    /// Candidates for a constructor starting at `start`.
    pub(crate) fn lookup(&self, data: &[u8], start: usize, context: &ContextState) -> &[u32] {
        let mut node = self;
        loop {
            match node {
                Tree::Leaf(cands) => return cands,
                Tree::Node {
                    bit,
                    all,
                    zero,
                    one,
                } => match bit.read(data, start, context) {
                    Some(false) => node = zero,
                    Some(true) => node = one,
                    None => return all,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcode_core::sla::Block;

    fn ctor(mask: u8, value: u8) -> ConstructorDef {
        ConstructorDef {
            pattern: Pattern {
                instruction: Block {
                    offset: 0,
                    mask: alloc::vec![mask],
                    value: alloc::vec![value],
                },
                ..Pattern::default()
            },
            length: 1,
            ..ConstructorDef::default()
        }
    }

    #[test]
    fn prunes_and_keeps_order() {
        let ctors = [ctor(0xff, 0x00), ctor(0xf0, 0x10), ctor(0x00, 0x00)];
        let tree = Tree::build(&ctors, &[0, 1, 2]);
        let ctx = ContextState::new(0);
        assert_eq!(tree.lookup(&[0x00], 0, &ctx), &[0, 2]);
        assert_eq!(tree.lookup(&[0x15], 0, &ctx), &[1, 2]);
        assert_eq!(tree.lookup(&[0x90], 0, &ctx), &[1, 2]);
    }

    #[test]
    fn missing_byte_returns_all() {
        let ctors = [ctor(0xff, 0x01), ctor(0xff, 0x02)];
        let tree = Tree::build(&ctors, &[0, 1]);
        let ctx = ContextState::new(0);
        assert_eq!(tree.lookup(&[], 0, &ctx), &[0, 1]);
        assert_eq!(tree.lookup(&[0, 2], 1, &ctx), &[1]);
    }
}
