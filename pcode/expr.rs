use pcode_core::{
    bytes::read_token,
    sla::Expr,
    utils::{sextract, zextract},
    Error,
};

use crate::{context::ContextState, language::Language, matcher::Operand};

/// Raw bits of a token field at `offset`, and its value (sign-extended if
/// the field is signed).
pub(crate) fn read_field(
    lang: &Language,
    field: u32,
    data: &[u8],
    offset: usize,
) -> Result<(u64, i64), Error> {
    let sla = lang.sla();
    let def = &sla.fields[field as usize];
    let token = &sla.tokens[def.token as usize];
    let bits = read_token(data, offset, token.size as usize, token.big_endian)?;
    let raw: u64 = zextract(bits, def.lsb, def.width());
    let value = if def.signed {
        sextract::<i64, _>(bits, def.lsb, def.width())
    } else {
        raw as i64
    };
    Ok((raw, value))
}

pub(crate) struct Env<'a> {
    pub lang: &'a Language,
    /// Instruction bytes.
    pub data: &'a [u8],
    /// Constructor start within `data`.
    pub start: usize,
    pub context: &'a ContextState,
    pub inst_start: u64,
    pub inst_next: u64,
    pub operands: &'a [Operand],
}

impl Env<'_> {
    pub(crate) fn eval(&self, expr: &Expr) -> Result<i64, Error> {
        let value = match expr {
            Expr::Const(value) => *value,
            Expr::Field(field) => read_field(self.lang, *field, self.data, self.start)?.1,
            Expr::Context(field) => {
                let def = &self.lang.sla().context_fields[*field as usize];
                self.context.value(def)
            }
            Expr::InstStart => self.inst_start as i64,
            Expr::InstNext => self.inst_next as i64,
            Expr::Operand(index) => self
                .operands
                .get(*index as usize)
                .map_or(0, |i| i.value()),
            Expr::Not(e) => !self.eval(e)?,
            Expr::Neg(e) => self.eval(e)?.wrapping_neg(),
            Expr::Binary(op, a, b) => op.apply(self.eval(a)?, self.eval(b)?),
        };
        Ok(value)
    }
}
