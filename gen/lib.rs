//! Builder producing compiled language descriptions.
//!
//! Languages are declared in Rust, usually from a `build.rs`, and written
//! out as a blob the `pcode` engine loads at run time.
//!
//! ```no_run
//! use pcode_gen::{val::reg, SpecBuilder};
//!
//! SpecBuilder::new("tiny")
//!     .space("ram", 2, 1)
//!     .space("register", 1, 1)
//!     .register("a", "register", 0, 1)
//!     .token("op", 8)
//!     .field("opcode", "op", 0, 7)
//!     .constructor("instruction", "CLR", |c| {
//!         c.is("opcode", 0x01).copy(reg("a"), pcode_gen::val::int(0, 1));
//!     })
//!     .write("tiny.sla")
//!     .unwrap();
//! ```

mod ctor;
pub mod exp;
pub mod val;

use std::{
    fmt,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use pcode_core::{
    sla::{
        Attach, ContextFieldDef, FieldDef, LoadError, RegisterDef, Sla, SpaceDef, TableDef,
        TokenDef,
    },
    SpaceKind,
};

pub use crate::{
    ctor::ConstructorBuilder,
    exp::Exp,
    val::{Label, Val},
};
pub use pcode_core::OpCode;

const DEFAULT_UNIQUE_BASE: u64 = 0x1000_0000;

#[derive(Debug)]
pub enum ErrorKind {
    /// Unresolved names and malformed constructors, one per line.
    Definition(String),
    Invalid(LoadError),
    OutputDir(io::Error),
    OutputFile(io::Error),
    Write(io::Error),
}

#[derive(Debug)]
pub struct Error {
    path: PathBuf,
    kind: ErrorKind,
}

impl Error {
    fn new<S: Into<PathBuf>>(path: S, kind: ErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use ErrorKind as E;

        let path = self.path.display();
        match &self.kind {
            E::Definition(errors) => errors.fmt(fmt),
            E::Invalid(error) => error.fmt(fmt),
            E::OutputDir(error) => {
                write!(fmt, "failed to create output directory \"{path}\", {error}")
            }
            E::OutputFile(error) => {
                write!(fmt, "failed to create output file \"{path}\", {error}")
            }
            E::Write(error) => {
                write!(fmt, "failed to write output file \"{path}\", {error}")
            }
        }
    }
}

impl std::error::Error for Error {}

fn create_file(path: &Path) -> Result<File, Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| Error::new(parent, ErrorKind::OutputDir(error)))?;
    }
    File::create(path).map_err(|error| Error::new(path, ErrorKind::OutputFile(error)))
}

enum AttachDraft {
    Registers(Vec<String>),
    Names(Vec<String>),
    Values(Vec<i64>),
}

/// Declares a language: spaces, registers, tokens, context and tables.
///
/// The `const` and `unique` spaces are always present. The first processor
/// space declared is the default one unless [`SpecBuilder::default_space`]
/// says otherwise.
pub struct SpecBuilder {
    sla: Sla,
    default_space: Option<String>,
    root: String,
    attach: Vec<(String, AttachDraft)>,
    defaults: Vec<(String, u32)>,
    tables: Vec<(String, Vec<ConstructorBuilder>)>,
    errors: Vec<String>,
}

impl SpecBuilder {
    pub fn new(name: &str) -> Self {
        let space = |name: &str, kind, address_size| SpaceDef {
            name: name.into(),
            kind,
            address_size,
            word_size: 1,
            flags: 0,
            pointer_lower_bound: 0,
            pointer_upper_bound: 0,
            overlay_base: None,
        };
        Self {
            sla: Sla {
                name: name.into(),
                alignment: 1,
                unique_base: DEFAULT_UNIQUE_BASE,
                spaces: vec![
                    space("const", SpaceKind::Constant, 8),
                    space("unique", SpaceKind::Internal, 4),
                ],
                ..Sla::default()
            },
            default_space: None,
            root: "instruction".into(),
            attach: Vec::new(),
            defaults: Vec::new(),
            tables: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.sla.big_endian = big_endian;
        self
    }

    pub fn alignment(mut self, alignment: u32) -> Self {
        self.sla.alignment = alignment;
        self
    }

    pub fn unique_base(mut self, base: u64) -> Self {
        self.sla.unique_base = base;
        self
    }

    /// Add a processor space.
    pub fn space(mut self, name: &str, address_size: u32, word_size: u32) -> Self {
        self.sla.spaces.push(SpaceDef {
            name: name.into(),
            kind: SpaceKind::Processor,
            address_size,
            word_size,
            flags: 0,
            pointer_lower_bound: 0,
            pointer_upper_bound: 0,
            overlay_base: None,
        });
        self
    }

    pub fn space_flags(mut self, name: &str, flags: u32) -> Self {
        match self.sla.spaces.iter_mut().find(|i| i.name == name) {
            Some(space) => space.flags = flags,
            None => self.errors.push(format!("unknown space {name}")),
        }
        self
    }

    pub fn default_space(mut self, name: &str) -> Self {
        self.default_space = Some(name.into());
        self
    }

    pub fn register(mut self, name: &str, space: &str, offset: u64, size: u32) -> Self {
        match self.sla.spaces.iter().position(|i| i.name == space) {
            Some(index) => self.sla.registers.push(RegisterDef {
                name: name.into(),
                space: index as u32,
                offset,
                size,
            }),
            None => self.errors.push(format!("register {name} in unknown space {space}")),
        }
        self
    }

    /// Registers of equal `size` laid out back to back from `offset`.
    pub fn registers(mut self, space: &str, offset: u64, size: u32, names: &[&str]) -> Self {
        for (i, name) in names.iter().enumerate() {
            self = self.register(name, space, offset + i as u64 * size as u64, size);
        }
        self
    }

    /// Token of `bits` bits, using the byte order of the language.
    pub fn token(mut self, name: &str, bits: u32) -> Self {
        self.sla.tokens.push(TokenDef {
            name: name.into(),
            size: bits / 8,
            big_endian: false,
        });
        self
    }

    /// Field covering the bits `lsb..=msb` of `token`.
    pub fn field(mut self, name: &str, token: &str, lsb: u32, msb: u32) -> Self {
        match self.sla.tokens.iter().position(|i| i.name == token) {
            Some(index) => self.sla.fields.push(FieldDef {
                name: name.into(),
                token: index as u32,
                lsb,
                msb,
                signed: false,
                hex: true,
                attach: Attach::None,
            }),
            None => self.errors.push(format!("field {name} uses unknown token {token}")),
        }
        self
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut FieldDef> {
        let field = self.sla.fields.iter_mut().find(|i| i.name == name);
        if field.is_none() {
            self.errors.push(format!("unknown field {name}"));
        }
        field
    }

    pub fn signed(mut self, field: &str) -> Self {
        if let Some(field) = self.field_mut(field) {
            field.signed = true;
        }
        self
    }

    /// Display the field in decimal.
    pub fn decimal(mut self, field: &str) -> Self {
        if let Some(field) = self.field_mut(field) {
            field.hex = false;
        }
        self
    }

    /// Field values select registers, `_` marks an invalid encoding.
    pub fn attach_registers(mut self, field: &str, names: &[&str]) -> Self {
        let names = names.iter().map(|i| i.to_string()).collect();
        self.attach.push((field.into(), AttachDraft::Registers(names)));
        self
    }

    /// Field values display as names, `_` marks an invalid encoding.
    pub fn attach_names(mut self, field: &str, names: &[&str]) -> Self {
        let names = names.iter().map(|i| i.to_string()).collect();
        self.attach.push((field.into(), AttachDraft::Names(names)));
        self
    }

    pub fn attach_values(mut self, field: &str, values: &[i64]) -> Self {
        self.attach
            .push((field.into(), AttachDraft::Values(values.to_vec())));
        self
    }

    /// Context variable covering the bits `lsb..=msb` of context word `word`.
    pub fn context_field(mut self, name: &str, word: u32, lsb: u32, msb: u32) -> Self {
        self.sla.context_words = self.sla.context_words.max(word + 1);
        self.sla.context_fields.push(ContextFieldDef {
            name: name.into(),
            word,
            lsb,
            msb,
            signed: false,
            hex: false,
            default: 0,
        });
        self
    }

    pub fn context_default(mut self, name: &str, value: u32) -> Self {
        self.defaults.push((name.into(), value));
        self
    }

    pub fn user_op(mut self, name: &str) -> Self {
        self.sla.user_ops.push(name.into());
        self
    }

    /// Declare a table without constructors yet, fixing its position.
    pub fn table(mut self, name: &str) -> Self {
        self.table_mut(name);
        self
    }

    fn table_mut(&mut self, name: &str) -> &mut Vec<ConstructorBuilder> {
        let index = match self.tables.iter().position(|(i, _)| i == name) {
            Some(index) => index,
            None => {
                self.tables.push((name.into(), Vec::new()));
                self.tables.len() - 1
            }
        };
        &mut self.tables[index].1
    }

    /// Table decoding whole instructions, `instruction` by default.
    pub fn root(mut self, table: &str) -> Self {
        self.root = table.into();
        self
    }

    /// Add a constructor to `table`.
    ///
    /// The first word of `display` is the mnemonic, `{name}` refers to an
    /// operand. A display of a single sub-table operand shows that operand
    /// in place of the whole instruction.
    pub fn constructor(
        mut self,
        table: &str,
        display: &str,
        f: impl FnOnce(&mut ConstructorBuilder),
    ) -> Self {
        let mut ctor = ConstructorBuilder::new(display);
        f(&mut ctor);
        self.table_mut(table).push(ctor);
        self
    }

    fn resolve_attach(&mut self) {
        let attach = std::mem::take(&mut self.attach);
        for (field, draft) in attach {
            let optional = |name: &String| (name != "_").then(|| name.clone());
            let resolved = match draft {
                AttachDraft::Registers(names) => {
                    let mut list = Vec::with_capacity(names.len());
                    for name in &names {
                        if name == "_" {
                            list.push(None);
                            continue;
                        }
                        match self.sla.registers.iter().position(|i| &i.name == name) {
                            Some(index) => list.push(Some(index as u32)),
                            None => {
                                self.errors.push(format!("field {field} attaches unknown register {name}"));
                                list.push(None);
                            }
                        }
                    }
                    Attach::Registers(list)
                }
                AttachDraft::Names(names) => Attach::Names(names.iter().map(optional).collect()),
                AttachDraft::Values(values) => Attach::Values(values.into_iter().map(Some).collect()),
            };
            if let Some(field) = self.field_mut(&field) {
                field.attach = resolved;
            }
        }
    }

    /// Resolve every name and check the result.
    pub fn finish(mut self) -> Result<Sla, Error> {
        for token in &mut self.sla.tokens {
            token.big_endian = self.sla.big_endian;
        }
        self.resolve_attach();

        for (name, value) in std::mem::take(&mut self.defaults) {
            match self.sla.context_fields.iter_mut().find(|i| i.name == name) {
                Some(field) => field.default = value,
                None => self.errors.push(format!("default for unknown context variable {name}")),
            }
        }

        let default = match &self.default_space {
            Some(name) => self.sla.spaces.iter().position(|i| &i.name == name),
            None => self
                .sla
                .spaces
                .iter()
                .position(|i| i.kind == SpaceKind::Processor),
        };
        match default {
            Some(index) => self.sla.default_space = index as u32,
            None => self.errors.push("no default space".into()),
        }

        let names: Vec<String> = self.tables.iter().map(|(i, _)| i.clone()).collect();
        match names.iter().position(|i| *i == self.root) {
            Some(index) => self.sla.root = index as u32,
            None => self.errors.push(format!("root table {} is not declared", self.root)),
        }

        let mut tables = Vec::with_capacity(self.tables.len());
        for (name, ctors) in &self.tables {
            let mut table = TableDef {
                name: name.clone(),
                constructors: Vec::with_capacity(ctors.len()),
            };
            for (index, ctor) in ctors.iter().enumerate() {
                match ctor.resolve(&self.sla, &names) {
                    Ok(def) => table.constructors.push(def),
                    Err(msg) => self
                        .errors
                        .push(format!("{name}[{index}] \"{}\": {msg}", ctor.display())),
                }
            }
            tables.push(table);
        }

        if !self.errors.is_empty() {
            return Err(Error::new("", ErrorKind::Definition(self.errors.join("\n"))));
        }

        self.sla.tables = tables;
        self.sla
            .validate()
            .map_err(|error| Error::new("", ErrorKind::Invalid(error)))?;
        Ok(self.sla)
    }

    pub fn to_bytes(self) -> Result<Vec<u8>, Error> {
        self.finish().map(|sla| sla.to_bytes())
    }

    /// Write the blob to `path`, creating parent directories as needed.
    pub fn write(self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        create_file(path)?
            .write_all(&bytes)
            .map_err(|error| Error::new(path, ErrorKind::Write(error)))
    }
}
