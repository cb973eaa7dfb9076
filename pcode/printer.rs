use std::{
    cmp, fmt,
    io::{self, Write},
    string::FromUtf8Error,
};

use pcode_core::printer::{FormatterFn, OpPrinter};

use crate::{
    decoder::DecodePass, display, emit::Emitter, Context, DecodeError, Language, PcodeOp,
    TranslateFlags,
};

pub use pcode_core::printer::{PrinterExt, Style};

/// Display an op with register, space and user op names of `lang`.
pub fn display_op<'a, E: PrinterExt>(
    ext: &'a E,
    lang: &'a Language,
    op: &'a PcodeOp,
) -> impl fmt::Display + 'a {
    FormatterFn(move |fmt| OpPrinter::new(ext, lang).print_op(fmt, op))
}

pub trait WriteExt: Write {
    fn write_u8_hex(&mut self, byte: u8) -> io::Result<()> {
        const MAP: [u8; 16] = *b"0123456789abcdef";
        let buf = [MAP[(byte >> 4) as usize & 15], MAP[byte as usize & 15]];
        self.write_all(&buf)
    }

    fn write_spaces(&mut self, mut width: usize) -> io::Result<()> {
        while width > 0 {
            const FILL: [u8; 32] = [b' '; 32];
            let len = cmp::min(width, FILL.len());
            self.write_all(&FILL[..len])?;
            width -= len;
        }
        Ok(())
    }
}

impl<T: Write> WriteExt for T {}

/// Writes `address: bytes  mnemonic body` lines, optionally followed by
/// the p-code of each instruction.
pub struct Printer<'a, E: PrinterExt = ()> {
    context: &'a Context,
    ext: E,
    pcode: bool,
    flags: TranslateFlags,
    bytes_per_line: usize,
}

impl<'a, E: PrinterExt> Printer<'a, E> {
    pub(crate) fn new(context: &'a Context, ext: E) -> Self {
        Self {
            context,
            ext,
            pcode: false,
            flags: TranslateFlags::empty(),
            bytes_per_line: 6,
        }
    }

    /// Print the p-code of each instruction after it.
    pub fn pcode(mut self, pcode: bool) -> Self {
        self.pcode = pcode;
        self
    }

    /// Translate flags used for the p-code, block ends are marked with a comment.
    pub fn flags(mut self, flags: TranslateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn bytes_per_line(mut self, count: usize) -> Self {
        self.bytes_per_line = count.max(1);
        self
    }

    /// Prints the address and the first line of bytes, returns the rest.
    fn print_bytes<'b, W: Write>(&self, out: &mut W, address: u64, bytes: &'b [u8]) -> io::Result<&'b [u8]> {
        let addr_width = if address >= 0x1000 { 8 } else { 4 };
        let len = cmp::min(bytes.len(), self.bytes_per_line);
        write!(out, "{address:addr_width$x}:\t")?;
        for i in &bytes[..len] {
            out.write_u8_hex(*i)?;
            out.write_all(b" ")?;
        }
        out.write_spaces((self.bytes_per_line - len) * 3)?;
        Ok(&bytes[len..])
    }

    fn print_rest<W: Write>(&self, out: &mut W, mut address: u64, mut rest: &[u8]) -> io::Result<()> {
        while !rest.is_empty() {
            address = address.wrapping_add(self.bytes_per_line as u64);
            rest = self.print_bytes(out, address, rest)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn print<W: Write>(&self, out: &mut W, data: &[u8], base: u64, max: usize) -> io::Result<()> {
        let lang: &Language = self.context.language();
        let ext = &self.ext;
        let mut emitter = Emitter::new(lang);
        let mut ops = Vec::new();
        let mut consumed = 0;
        let mut res = Ok(());

        let mut pass = DecodePass::new(lang, &self.context.snapshot());
        let error = pass.run(data, base, max, |bytes, insn| {
            consumed += bytes.len();
            let (mnemonic, body) = display::render(lang, &insn);
            let line = FormatterFn(|fmt| {
                ext.print_mnemonic(fmt, &mnemonic)?;
                if !body.is_empty() {
                    write!(fmt, " {body}")?;
                }
                Ok(())
            });
            res = self
                .print_bytes(out, insn.address, bytes)
                .and_then(|rest| {
                    writeln!(out, "\t{line}")?;
                    self.print_rest(out, insn.address, rest)
                });

            if self.pcode && res.is_ok() {
                ops.clear();
                emitter.emit(&insn, &mut ops);
                for op in &ops {
                    let end = self.flags.contains(TranslateFlags::BB_TERMINATING)
                        && op.leaves_instruction();
                    let line = FormatterFn(|fmt| {
                        OpPrinter::new(ext, lang).print_op(fmt, op)?;
                        if end {
                            ext.print_comment(fmt, "\t; end of block")?;
                        }
                        Ok(())
                    });
                    res = writeln!(out, "\t\t{line}");
                    if res.is_err() {
                        break;
                    }
                }
            }
            res.is_ok()
        });
        res?;

        if let Some(DecodeError::Failed(_)) = error {
            if consumed < data.len() {
                let address = base.wrapping_add(consumed as u64);
                let len = cmp::min(data.len() - consumed, lang.min_len());
                self.print_bytes(out, address, &data[consumed..consumed + len])?;
                let msg = FormatterFn(|fmt| ext.print_comment(fmt, "failed to decode"));
                writeln!(out, "\t{msg}")?;
            }
        }
        Ok(())
    }

    pub fn print_to_vec(&self, data: &[u8], base: u64, max: usize) -> Vec<u8> {
        let mut out = Vec::new();
        // writing to a vector cannot fail
        let _ = self.print(&mut out, data, base, max);
        out
    }

    pub fn print_to_string(&self, data: &[u8], base: u64, max: usize) -> Result<String, FromUtf8Error> {
        String::from_utf8(self.print_to_vec(data, base, max))
    }
}
