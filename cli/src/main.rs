#[macro_use]
extern crate log;

mod cli;

use std::{
    error::Error,
    fs,
    io::{self, Write},
    process,
};

use object::{Object, ObjectSection, SectionKind};
use pcode::{Arch, Context, PrinterExt, TranslateFlags};

#[cfg(feature = "color")]
use std::fmt::{self, Display};

#[cfg(feature = "color")]
use pcode::Style;

use crate::cli::{Cli, Color, Input, Language, Mode};

#[derive(Copy, Clone)]
struct Info {
    #[cfg_attr(not(feature = "color"), allow(dead_code))]
    color: Color,
}

impl PrinterExt for Info {
    #[cfg(feature = "color")]
    fn print_styled(
        &self,
        fmt: &mut fmt::Formatter,
        style: Style,
        display: impl fmt::Display,
    ) -> fmt::Result {
        use owo_colors::OwoColorize;

        match self.color {
            Color::Off => display.fmt(fmt),
            Color::On => match style {
                Style::Mnemonic => display.yellow().fmt(fmt),
                Style::Register => display.blue().fmt(fmt),
                Style::Immediate => display.magenta().fmt(fmt),
                Style::Address => display.magenta().fmt(fmt),
                Style::Space => display.cyan().fmt(fmt),
                Style::Operator => display.fmt(fmt),
                Style::Comment => display.dimmed().fmt(fmt),
            },
        }
    }
}

/// Code to process with its load address and a title.
struct Chunk<'a> {
    name: Option<&'a str>,
    address: u64,
    data: &'a [u8],
}

// ignore broken pipe error
fn helper(result: io::Result<()>) -> io::Result<()> {
    if matches!(result, Err(ref e) if e.kind() == io::ErrorKind::BrokenPipe) {
        Ok(())
    } else {
        result
    }
}

fn list_languages() {
    for arch in Arch::all() {
        println!("{}\t{}", arch.id(), arch.description());
    }
}

fn create_context(cli: &Cli) -> Result<Context, Box<dyn Error>> {
    let mut context = match &cli.language {
        Some(Language::Id(id)) => Context::from_id(id)?,
        Some(Language::Sla(path)) => {
            let data = fs::read(path).map_err(|err| format!("{}: {err}", path.display()))?;
            Context::new(&data)?
        }
        None => return Err("no language given, use --lid or --sla".into()),
    };
    for (name, value) in &cli.context {
        context.set_context_default(name, *value)?;
    }
    debug!("{:?}", context.language());
    Ok(context)
}

fn print_registers(context: &Context) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for info in context.registers() {
        let vn = &info.varnode;
        writeln!(out, "{}\t{}[{:x}:{}]", info.name, vn.space.name, vn.offset, vn.size)?;
    }
    Ok(())
}

fn process_chunk(cli: &Cli, context: &Context, mode: Mode, chunk: &Chunk) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if let Some(name) = chunk.name {
        writeln!(out, "\nDisassembly of section {name}:")?;
    }
    let mut flags = TranslateFlags::empty();
    if cli.bb {
        flags |= TranslateFlags::BB_TERMINATING;
    }
    context
        .printer(Info { color: cli.color })
        .pcode(mode == Mode::Translate)
        .flags(flags)
        .print(&mut out, chunk.data, chunk.address, cli.max)?;
    out.flush()
}

fn sections<'a>(cli: &'a Cli, file: &'a object::File<'a>) -> Result<Vec<Chunk<'a>>, Box<dyn Error>> {
    let mut chunks = Vec::new();
    let mut push = |section: object::Section<'a, 'a>| -> Result<(), Box<dyn Error>> {
        chunks.push(Chunk {
            name: Some(section.name()?),
            address: section.address(),
            data: section.data()?,
        });
        Ok(())
    };
    if cli.sections.is_empty() {
        for section in file.sections() {
            if section.kind() == SectionKind::Text {
                push(section)?;
            }
        }
    } else {
        for name in &cli.sections {
            match file.section_by_name(name) {
                Some(section) => push(section)?,
                None => warn!("section {name} not found"),
            }
        }
    }
    Ok(chunks)
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    if cli.list {
        list_languages();
        if cli.language.is_none() {
            return Ok(());
        }
    }

    let context = create_context(cli)?;
    if cli.registers {
        helper(print_registers(&context))?;
    }

    let mode = match (cli.mode, &cli.input) {
        (Some(mode), Some(_)) => mode,
        (None, None) if cli.registers => return Ok(()),
        (None, _) => return Err("one of -d/--disasm or -t/--translate is required".into()),
        (Some(_), None) => return Err("no input, use --data or FILE".into()),
    };

    match &cli.input {
        Some(Input::Data(data)) => {
            let chunk = Chunk {
                name: None,
                address: cli.base,
                data,
            };
            helper(process_chunk(cli, &context, mode, &chunk))?;
        }
        Some(Input::File(path)) => {
            let data = fs::read(path).map_err(|err| format!("{}: {err}", path.display()))?;
            let file = object::File::parse(&*data)?;
            for chunk in sections(cli, &file)? {
                helper(process_chunk(cli, &context, mode, &chunk))?;
            }
        }
        None => {}
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let cli = cli::parse_cli();
    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}
