use pcode_core::Error;

use crate::{
    context::ContextState,
    language::Language,
    matcher::{Decoded, Matcher},
};

/// One decode pass over a byte stream.
///
/// The pass owns its context, committed context changes made by one
/// instruction are seen by the following ones.
pub(crate) struct DecodePass<'a> {
    lang: &'a Language,
    context: ContextState,
}

impl<'a> DecodePass<'a> {
    pub(crate) fn new(lang: &'a Language, context: &ContextState) -> Self {
        Self {
            lang,
            context: context.clone(),
        }
    }

    /// Decode the instruction at the start of `data`.
    pub(crate) fn decode(&mut self, data: &[u8], address: u64) -> Result<Decoded, Error> {
        let insn = Matcher::new(self.lang, data, address, &self.context).run()?;
        let fields = &self.lang.sla().context_fields;
        for &(field, value) in &insn.commits {
            self.context.set(&fields[field as usize], value);
        }
        Ok(insn)
    }

    /// Decode up to `max` instructions from `bytes` loaded at `base`.
    ///
    /// `f` receives each instruction with its bytes and returns `false` to stop.
    /// Returns the reason decoding stopped early, if any.
    pub(crate) fn run<F>(&mut self, bytes: &[u8], base: u64, max: usize, mut f: F) -> Option<Error>
    where
        F: FnMut(&[u8], Decoded) -> bool,
    {
        let min_len = self.lang.min_len();
        let mut offset = 0;
        let mut address = base;
        let mut count = 0;
        while offset < bytes.len() && count < max {
            let cur = &bytes[offset..];
            if cur.len() < min_len {
                debug!("{address:#x}: {} bytes left, shortest encoding is {min_len}", cur.len());
                return Some(Error::More(min_len));
            }
            let insn = match self.decode(cur, address) {
                Ok(insn) => insn,
                Err(err) => {
                    debug!("{address:#x}: {err}");
                    return Some(err);
                }
            };
            let len = insn.length;
            offset += len;
            address = address.wrapping_add(len as u64);
            count += 1;
            if !f(&cur[..len], insn) {
                break;
            }
        }
        None
    }
}
