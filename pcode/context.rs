use alloc::vec::Vec;

use pcode_core::{flags::Field, sla::ContextFieldDef, utils::sextract};

/// Bindings of every context variable of a language.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContextState {
    words: Vec<u32>,
}

fn bits(def: &ContextFieldDef) -> Field {
    Field::from_bits(def.lsb, def.msb)
}

impl ContextState {
    pub(crate) fn new(words: usize) -> Self {
        Self {
            words: alloc::vec![0; words],
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn word(&self, index: usize) -> u32 {
        self.words.get(index).copied().unwrap_or(0)
    }

    /// Raw unsigned value of a field.
    pub fn get(&self, def: &ContextFieldDef) -> u32 {
        bits(def).get(self.word(def.word as usize))
    }

    /// Field value, sign-extended for signed fields.
    pub fn value(&self, def: &ContextFieldDef) -> i64 {
        let raw = self.word(def.word as usize);
        if def.signed {
            sextract::<i32, _>(raw, def.lsb, def.msb - def.lsb + 1) as i64
        } else {
            self.get(def) as i64
        }
    }

    /// Writes `value` truncated to the field width.
    pub fn set(&mut self, def: &ContextFieldDef, value: u32) {
        if let Some(word) = self.words.get_mut(def.word as usize) {
            let field = bits(def);
            *word = field.set(*word, value & field.max());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(word: u32, lsb: u32, msb: u32, signed: bool) -> ContextFieldDef {
        ContextFieldDef {
            name: "f".into(),
            word,
            lsb,
            msb,
            signed,
            hex: false,
            default: 0,
        }
    }

    #[test]
    fn set_truncates() {
        let mut ctx = ContextState::new(2);
        let mode = def(1, 4, 5, false);
        ctx.set(&mode, 7);
        assert_eq!(ctx.get(&mode), 3);
        assert_eq!(ctx.words(), &[0, 0x30]);
    }

    #[test]
    fn signed_value() {
        let mut ctx = ContextState::new(1);
        let field = def(0, 0, 3, true);
        ctx.set(&field, 0xf);
        assert_eq!(ctx.value(&field), -1);
        assert_eq!(ctx.get(&field), 0xf);
    }

    #[test]
    fn full_word() {
        let mut ctx = ContextState::new(1);
        let field = def(0, 0, 31, false);
        ctx.set(&field, u32::MAX);
        assert_eq!(ctx.get(&field), u32::MAX);
    }
}
