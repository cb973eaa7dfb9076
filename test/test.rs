use std::{fmt, iter::Peekable, str::Lines};

use pcode::{display_op, Context, TranslateFlags};

use super::utils::Diff;

#[derive(Clone, Debug, PartialEq, Eq)]
struct ParserError {
    file: String,
    line: usize,
    msg: String,
}

impl ParserError {
    fn new(file: &str, line: usize, msg: String) -> Self {
        Self {
            file: file.to_owned(),
            line,
            msg,
        }
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "error: {}, {}:{}", self.msg, self.file, self.line)
    }
}

/// One instruction of a `.test` file.
///
/// ```text
/// 1000: 10 01     ADD r0, r1      # +flag
///                 | r0 = r0 + r1
/// ```
///
/// Lines starting with `|` hold the expected p-code of the instruction
/// above them.
#[derive(Clone, Debug, Default)]
pub struct Test<'a> {
    pub line: usize,
    pub comment: &'a str,
    pub address: u64,
    pub bytes: Vec<u8>,
    pub asm: &'a str,
    pub pcode: Vec<&'a str>,
}

pub struct Parser<'a> {
    file: String,
    lines: Peekable<Lines<'a>>,
    line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(file: &str, input: &'a str) -> Self {
        Self {
            file: file.to_owned(),
            lines: input.lines().peekable(),
            line: 0,
        }
    }

    fn error<T>(&self, msg: String) -> Result<T, String> {
        Err(ParserError::new(&self.file, self.line, msg).to_string())
    }

    fn parse_pcode(&mut self, output: &mut Test<'a>) {
        while let Some(line) = self.lines.peek() {
            let line = line.trim();
            match line.strip_prefix('|') {
                Some(op) => {
                    output.pcode.push(op.trim());
                    self.lines.next();
                    self.line += 1;
                }
                None => break,
            }
        }
    }

    pub fn parse(&mut self, output: &mut Test<'a>) -> Result<bool, String> {
        output.bytes.clear();
        output.pcode.clear();
        output.asm = "";

        while let Some(line) = self.lines.next().map(|l| l.trim()) {
            self.line += 1;

            let (line, comment) = line.split_once('#').unwrap_or((line, ""));

            let mut cur = line.trim();
            if cur.is_empty() || cur == "..." {
                continue;
            }
            if cur.starts_with('|') {
                return self.error("p-code without an instruction".to_owned());
            }

            output.comment = comment.trim();
            output.line = self.line;

            // parse address
            output.address = 0;
            if let Some(pos) = cur.find(':') {
                let (head, tail) = cur.split_at(pos);
                if head.chars().count() < 17 {
                    match u64::from_str_radix(head.trim(), 16) {
                        Ok(i) => output.address = i,
                        Err(_) => {
                            return self.error(format!("invalid address \"{head}\""));
                        }
                    }
                    cur = tail[1..].trim_start();
                }
            }

            // parse bytes, two spaces end the byte list
            while !cur.is_empty() {
                let stop = cur.chars().take_while(|c| c.is_whitespace()).count() > 1;
                cur = cur.trim_start();
                if stop {
                    break;
                }
                match cur.find(|c: char| !c.is_ascii_hexdigit()) {
                    Some(2) => {
                        let (head, tail) = cur.split_at(2);
                        match u8::from_str_radix(head, 16) {
                            Ok(byte) => output.bytes.push(byte),
                            Err(_) => return self.error(format!("invalid byte \"{head}\"")),
                        }
                        cur = tail;
                    }
                    None if cur.len() == 2 => {
                        match u8::from_str_radix(cur, 16) {
                            Ok(byte) => output.bytes.push(byte),
                            Err(_) => return self.error(format!("invalid byte \"{cur}\"")),
                        }
                        cur = "";
                    }
                    _ => break,
                }
            }

            if output.bytes.is_empty() {
                return self.error("no instruction bytes".to_owned());
            }

            output.asm = cur;
            self.parse_pcode(output);
            return Ok(true);
        }

        Ok(false)
    }

    /// Concatenate the bytes of every instruction, zero-filling gaps.
    ///
    /// Returns the address of the first instruction and the bytes.
    pub fn parse_all(src: &str) -> Result<(u64, Vec<u8>), String> {
        let mut parser = Parser::new("input", src);
        let mut test = Test::default();
        let mut start = None;
        let mut address = 0;
        let mut data = vec![];
        while parser.parse(&mut test)? {
            if start.is_none() {
                start = Some(test.address);
                address = test.address;
            }
            while address < test.address {
                data.push(0);
                address += 1;
            }
            data.extend_from_slice(&test.bytes);
            address += test.bytes.len() as u64;
        }
        Ok((start.unwrap_or(0), data))
    }
}

pub fn parse_flags(s: &str) -> impl Iterator<Item = (&str, bool)> {
    s.split_whitespace().filter_map(|i| {
        let state = match i.chars().next() {
            Some('+') => true,
            Some('-') => false,
            _ => return None,
        };
        let name = &i[1..];
        Some((name, state))
    })
}

fn push_normalized(out: &mut String, s: &str) {
    for (i, s) in s.split_whitespace().enumerate() {
        if i != 0 {
            out.push(' ');
        }
        out.push_str(s);
    }
}

fn lines_to_string<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for (i, line) in lines.into_iter().enumerate() {
        if i != 0 {
            out.push('\n');
        }
        push_normalized(&mut out, line);
    }
    out
}

fn pcode_to_string(context: &Context, bytes: &[u8], address: u64, flags: TranslateFlags) -> String {
    let translation = context.translate(bytes, address, 1, flags);
    let lang = context.language();
    let ops: Vec<String> = translation
        .ops
        .iter()
        .map(|op| display_op(&(), lang, op).to_string())
        .collect();
    lines_to_string(ops.iter().map(|i| i.as_str()))
}

pub trait Runner {
    /// Engine used to decode `test`.
    fn create(&mut self, test: &Test) -> Context;

    fn translate_flags(&self, _test: &Test) -> TranslateFlags {
        TranslateFlags::empty()
    }

    fn run(&mut self, file: &str, tests: &str) -> Result<(), String> {
        let mut test = Test::default();
        let mut parser = Parser::new(file, tests);
        let mut failed = 0;
        while parser.parse(&mut test)? {
            let context = self.create(&test);
            let disassembly = context.disassemble(&test.bytes, test.address, 1);
            let (len, mut result) = match disassembly.instructions.first() {
                Some(insn) => (insn.length, lines_to_string([insn.to_string().as_str()])),
                None => (0, String::new()),
            };
            let mut expect = lines_to_string([test.asm]);

            if !test.pcode.is_empty() {
                let flags = self.translate_flags(&test);
                let pcode = pcode_to_string(&context, &test.bytes, test.address, flags);
                result.push('\n');
                result.push_str(&pcode);
                expect.push('\n');
                expect.push_str(&lines_to_string(test.pcode.iter().copied()));
            }

            let expect_len = test.bytes.len();
            if len == 0 || len != expect_len || result != expect {
                failed += 1;

                if len == 0 {
                    let reason = disassembly
                        .error
                        .map_or_else(String::new, |err| format!(" ({err})"));
                    eprintln!("error: failed to decode{reason}, {}:{}", file, test.line);
                } else {
                    if len != expect_len {
                        eprintln!("error: invalid length, {}:{}", file, test.line);
                        eprintln!("  expect: {expect_len}");
                        eprintln!("  result: {len}");
                    }
                    if result != expect {
                        eprintln!("error: invalid output, {}:{}", file, test.line);
                    }
                }

                let diff = Diff::new(file, test.line, &test.bytes, &expect, &result);
                eprintln!("{diff}");
            }
        }
        if failed == 0 {
            Ok(())
        } else {
            Err(format!("failed {failed} tests"))
        }
    }
}
