use alloc::vec::Vec;

use pcode_core::{
    sla::{ConstTpl, ConstructorDef, ContextFieldDef, Export, LoadError, Sla, SpaceTpl, Stmt, VarnodeTpl},
    Options,
};

use crate::{context::ContextState, registers::RegisterTable, spaces::Spaces, tree::Tree};

const TEMP_ALIGN: u64 = 0x10;

struct TableIndex {
    /// Constructor indices, most specific first, then declaration order.
    order: Vec<u32>,
    tree: Option<Tree>,
    /// Unique-space bytes used by each constructor's temporaries.
    temp_spans: Vec<u64>,
}

/// The immutable part of an engine, shared by every engine instance
/// created from the same blob.
pub struct Language {
    sla: Sla,
    spaces: Spaces,
    registers: RegisterTable,
    tables: Vec<TableIndex>,
    min_len: usize,
    defaults: ContextState,
    opts: Options,
}

pub(crate) fn align_temp(size: u64) -> u64 {
    (size.max(1) + TEMP_ALIGN - 1) & !(TEMP_ALIGN - 1)
}

fn temp_span(ctor: &ConstructorDef, unique: u32) -> u64 {
    let mut end = 0;
    let mut visit = |vn: &VarnodeTpl| {
        if let (SpaceTpl::Space(space), ConstTpl::Real(offset), ConstTpl::Real(size)) =
            (&vn.space, &vn.offset, &vn.size)
        {
            if *space == unique {
                end = end.max(offset.saturating_add(*size));
            }
        }
    };
    for stmt in &ctor.semantics {
        if let Stmt::Op(op) = stmt {
            op.output.iter().chain(&op.inputs).for_each(&mut visit);
        }
    }
    match &ctor.export {
        Some(Export::Varnode(vn)) => visit(vn),
        Some(Export::Pointer { pointer, .. }) => visit(pointer),
        None => {}
    }
    if end == 0 {
        0
    } else {
        align_temp(end)
    }
}

impl Language {
    /// Decode and validate a blob.
    pub fn load(data: &[u8], opts: Options) -> Result<Self, LoadError> {
        Ok(Self::build(Sla::from_bytes(data)?, opts))
    }

    /// Validate an in-memory language description.
    pub fn from_sla(sla: Sla, opts: Options) -> Result<Self, LoadError> {
        sla.validate()?;
        Ok(Self::build(sla, opts))
    }

    fn build(sla: Sla, opts: Options) -> Self {
        let spaces = Spaces::new(&sla);
        let registers = RegisterTable::new(&sla, &spaces);
        let unique = spaces.unique().index;

        let tables = sla
            .tables
            .iter()
            .map(|table| {
                let ctors = &table.constructors;
                let mut order: Vec<u32> = (0..ctors.len() as u32).collect();
                // stable, equal specificity keeps declaration order
                order.sort_by_key(|&i| core::cmp::Reverse(ctors[i as usize].pattern.specificity()));
                let tree = opts.decision_trees.then(|| Tree::build(ctors, &order));
                let temp_spans = ctors.iter().map(|i| temp_span(i, unique)).collect();
                TableIndex {
                    order,
                    tree,
                    temp_spans,
                }
            })
            .collect();

        let min_len = sla.tables[sla.root as usize]
            .constructors
            .iter()
            .map(|i| i.length.max(i.pattern.instruction.end()) as usize)
            .min()
            .unwrap_or(1)
            .max(1);

        let mut defaults = ContextState::new(sla.context_words as usize);
        for def in &sla.context_fields {
            defaults.set(def, def.default);
        }

        debug!(
            "language {}: {} spaces, {} registers, {} tables, {} context fields",
            sla.name,
            spaces.len(),
            registers.len(),
            sla.tables.len(),
            sla.context_fields.len(),
        );

        Self {
            sla,
            spaces,
            registers,
            tables,
            min_len,
            defaults,
            opts,
        }
    }

    pub fn name(&self) -> &str {
        &self.sla.name
    }

    pub fn sla(&self) -> &Sla {
        &self.sla
    }

    pub fn spaces(&self) -> &Spaces {
        &self.spaces
    }

    pub fn registers(&self) -> &RegisterTable {
        &self.registers
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Length of the shortest root encoding.
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Context declared by the blob, before any override.
    pub fn context_defaults(&self) -> &ContextState {
        &self.defaults
    }

    pub fn context_field(&self, name: &str) -> Option<&ContextFieldDef> {
        self.sla.context_fields.iter().find(|i| i.name == name)
    }

    pub fn user_op_name(&self, index: u64) -> Option<&str> {
        self.sla.user_ops.get(index as usize).map(|i| i.as_str())
    }

    pub(crate) fn constructor(&self, table: u32, ctor: u32) -> &ConstructorDef {
        &self.sla.tables[table as usize].constructors[ctor as usize]
    }

    pub(crate) fn temp_span(&self, table: u32, ctor: u32) -> u64 {
        self.tables[table as usize].temp_spans[ctor as usize]
    }

    /// Constructors of `table` worth checking at `start`, in priority order.
    pub(crate) fn candidates(&self, table: u32, data: &[u8], start: usize, context: &ContextState) -> &[u32] {
        let index = &self.tables[table as usize];
        match &index.tree {
            Some(tree) => tree.lookup(data, start, context),
            None => &index.order,
        }
    }
}

#[cfg(feature = "print")]
impl pcode_core::printer::Names for Language {
    fn register_name(&self, space: &pcode_core::AddressSpace, offset: u64, size: i32) -> Option<&str> {
        self.registers.name_of(space.index, offset, size)
    }

    fn space_name(&self, index: u64) -> Option<&str> {
        self.spaces.get(index as usize).map(|i| i.name.as_str())
    }

    fn user_op_name(&self, index: u64) -> Option<&str> {
        Language::user_op_name(self, index)
    }
}

impl core::fmt::Debug for Language {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.debug_struct("Language")
            .field("name", &self.sla.name)
            .field("spaces", &self.spaces.len())
            .field("registers", &self.registers.len())
            .field("tables", &self.tables.len())
            .finish()
    }
}
