use std::{num::ParseIntError, path::PathBuf};

use bpaf::*;

#[derive(Copy, Clone, Debug)]
pub enum Color {
    Off,
    On,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Disasm,
    Translate,
}

#[derive(Clone, Debug)]
pub enum Language {
    Id(String),
    Sla(PathBuf),
}

#[derive(Clone, Debug)]
pub enum Input {
    Data(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Cli {
    pub list: bool,
    pub registers: bool,
    pub language: Option<Language>,
    pub mode: Option<Mode>,
    pub sections: Vec<String>,
    pub base: u64,
    pub max: usize,
    pub context: Vec<(String, u32)>,
    pub color: Color,
    pub bb: bool,
    pub input: Option<Input>,
}

fn parse_address(s: &str) -> Result<u64, ParseIntError> {
    if s.starts_with("0x") || s.starts_with("0X") {
        u64::from_str_radix(&s[2..], 16)
    } else {
        s.parse()
    }
}

/// Parse bytes written as hex pairs, whitespace is ignored.
fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = s.bytes().filter(|c| !c.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in {s:?}"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|_| format!("invalid hex in {s:?}"))?;
            u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte {pair:?}"))
        })
        .collect()
}

fn parse_assign(s: &str) -> Result<(String, u32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))?;
    let value = parse_address(value.trim())
        .ok()
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| format!("invalid value for {name}"))?;
    Ok((name.trim().into(), value))
}

pub fn parse_cli() -> Cli {
    let list = long("list")
        .help("List built-in languages")
        .switch();

    let registers = long("registers")
        .help("List registers of the language")
        .switch();

    let lid = long("lid")
        .help("Built-in language id")
        .argument::<String>("ID")
        .map(Language::Id);
    let sla = long("sla")
        .help("Compiled language description")
        .argument::<PathBuf>("FILE")
        .map(Language::Sla);
    let language = construct!([lid, sla]).optional();

    let disasm = short('d')
        .long("disasm")
        .help("Disassemble instructions")
        .req_flag(Mode::Disasm);
    let translate = short('t')
        .long("translate")
        .help("Translate instructions to p-code")
        .req_flag(Mode::Translate);
    let mode = construct!([disasm, translate]).optional();

    let sections = short('j')
        .long("section")
        .help("Only process section NAME of FILE")
        .argument("NAME")
        .many();

    let base = long("base")
        .help("Address of the first byte of --data [default: 0x401000]")
        .argument::<String>("ADDR")
        .parse(|s| parse_address(&s))
        .fallback(0x401000);

    let max = long("max")
        .help("Maximum number of instructions per input [default: 1024]")
        .argument::<usize>("N")
        .fallback(1024);

    let context = short('s')
        .long("set")
        .help("Set the default of a context variable")
        .argument::<String>("NAME=VALUE")
        .parse(|s| parse_assign(&s))
        .many();

    let auto_color = color_support();

    let color = long("color")
        .help("Enable or disable color output [default: auto, valid modes: off, on, auto]")
        .argument::<String>("MODE")
        .parse(move |s| match s.as_str() {
            "off" => Ok(Color::Off),
            "on" => Ok(Color::On),
            "auto" => Ok(auto_color),
            _ => Err(format!("invalid color {s}")),
        })
        .fallback(auto_color);

    let bb = long("bb")
        .help("Mark ops that end a basic block")
        .switch();

    let data = long("data")
        .help("Bytes to process, as hex pairs")
        .argument::<String>("HEX")
        .parse(|s| parse_hex(&s))
        .map(Input::Data);
    let file = positional::<PathBuf>("FILE")
        .help("ELF file to process")
        .map(Input::File);
    let input = construct!([data, file]).optional();

    construct!(Cli {
        list,
        registers,
        language,
        mode,
        sections,
        base,
        max,
        context,
        color,
        bb,
        input,
    })
    .to_options()
    .version(env!("CARGO_PKG_VERSION"))
    .descr("Disassemble and translate machine code to p-code")
    .run()
}

#[cfg(feature = "color")]
fn color_support() -> Color {
    supports_color::on(supports_color::Stream::Stdout).map_or(Color::Off, |_| Color::On)
}

#[cfg(not(feature = "color"))]
fn color_support() -> Color {
    Color::Off
}
