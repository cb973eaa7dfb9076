//! Constructor matching with backtracking.

use alloc::{collections::BTreeMap, vec::Vec};

use pcode_core::{
    sla::{ConstructorDef, OperandKind, Pattern},
    Error,
};

use crate::{context::ContextState, expr::{read_field, Env}, language::Language};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Value {
    /// Raw bits and interpreted value.
    Int { raw: u64, value: i64 },
    /// Index of the matched sub-constructor node.
    Node(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Operand {
    /// Offset from the instruction start.
    pub start: usize,
    pub length: usize,
    pub value: Value,
}

impl Operand {
    fn end(&self) -> usize {
        self.start + self.length
    }

    pub(crate) fn value(&self) -> i64 {
        match self.value {
            Value::Int { value, .. } => value,
            Value::Node(_) => 0,
        }
    }

    pub(crate) fn raw(&self) -> u64 {
        match self.value {
            Value::Int { raw, .. } => raw,
            Value::Node(_) => 0,
        }
    }
}

/// A matched constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Node {
    pub table: u32,
    pub ctor: u32,
    /// Offset from the instruction start.
    pub start: usize,
    pub length: usize,
    pub operands: Vec<Operand>,
    /// Context seen by the constructor after its own changes.
    pub context: ContextState,
}

/// A decoded instruction, the root constructor is the first node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Decoded {
    pub address: u64,
    pub length: usize,
    pub nodes: Vec<Node>,
    /// Context the instruction was decoded with.
    pub context: ContextState,
    /// Committed context writes as (field, value).
    pub commits: Vec<(u32, u32)>,
}

impl Decoded {
    pub(crate) fn root(&self) -> &Node {
        &self.nodes[0]
    }

    pub(crate) fn inst_next(&self) -> u64 {
        self.address.wrapping_add(self.length as u64)
    }
}

/// Sub-match arguments: table, start, depth and context words.
type MatchKey = (u32, usize, usize, Vec<u32>);

pub(crate) struct Matcher<'a> {
    lang: &'a Language,
    data: &'a [u8],
    address: u64,
    nodes: Vec<Node>,
    context: ContextState,
    commits: Vec<(u32, u32)>,
    /// Failed sub-matches of the current instruction.
    failures: BTreeMap<MatchKey, Error>,
    steps: usize,
}

impl<'a> Matcher<'a> {
    pub(crate) fn new(lang: &'a Language, data: &'a [u8], address: u64, context: &ContextState) -> Self {
        Self {
            lang,
            data,
            address,
            nodes: Vec::new(),
            context: context.clone(),
            commits: Vec::new(),
            failures: BTreeMap::new(),
            steps: 0,
        }
    }

    /// Match one instruction at the start of the data.
    pub(crate) fn run(mut self) -> Result<Decoded, Error> {
        let initial = self.context.clone();
        let root = self.match_table(self.lang.sla().root, 0, 0)?;
        debug_assert_eq!(root, 0);
        let length = self.nodes[root].length;
        if length == 0 {
            return Err(Error::Failed(0));
        }
        let inst_next = self.address.wrapping_add(length as u64);
        self.resolve_expressions(inst_next)?;
        Ok(Decoded {
            address: self.address,
            length,
            nodes: self.nodes,
            context: initial,
            commits: self.commits,
        })
    }

    /// `More` if the available bytes agree with the pattern but it needs
    /// bytes past the end of the data.
    fn check_pattern(&self, pattern: &Pattern, start: usize) -> Result<bool, Error> {
        let ctx = &pattern.context;
        let ctx_ok = ctx
            .mask
            .iter()
            .zip(&ctx.value)
            .enumerate()
            .all(|(i, (m, v))| self.context.word(ctx.offset as usize + i) & m == *v);
        if !ctx_ok {
            return Ok(false);
        }
        let insn = &pattern.instruction;
        let offset = start + insn.offset as usize;
        for (i, (m, v)) in insn.mask.iter().zip(&insn.value).enumerate() {
            match self.data.get(offset + i) {
                Some(b) if b & m != *v => return Ok(false),
                Some(_) => {}
                None => return Err(Error::More(start + insn.end() as usize)),
            }
        }
        Ok(true)
    }

    fn match_table(&mut self, table: u32, start: usize, depth: usize) -> Result<usize, Error> {
        if depth > self.lang.options().max_depth {
            debug!("{:#x}: nesting deeper than {}", self.address, self.lang.options().max_depth);
            return Err(Error::Failed(start));
        }

        // a sub-match only depends on its arguments
        let key = (table, start, depth, self.context.words().to_vec());
        if let Some(err) = self.failures.get(&key) {
            return Err(err.clone());
        }
        let err = match self.match_candidates(table, start, depth) {
            Ok(node) => return Ok(node),
            Err(err) => err,
        };
        self.failures.insert(key, err.clone());
        Err(err)
    }

    /// `More` only if no candidate matches and one needs bytes past the end
    /// of the data, with the largest length needed.
    fn match_candidates(&mut self, table: u32, start: usize, depth: usize) -> Result<usize, Error> {
        let lang = self.lang;
        let mut needed = None;
        let candidates = lang.candidates(table, self.data, start, &self.context);
        for &index in candidates {
            let ctor = lang.constructor(table, index);
            match self.check_pattern(&ctor.pattern, start) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(Error::More(len)) => {
                    needed = needed.max(Some(len));
                    continue;
                }
                Err(err) => return Err(err),
            }
            let end = start + ctor.length as usize;
            if self.data.len() < end {
                needed = needed.max(Some(end));
                continue;
            }

            self.steps += 1;
            if self.steps > lang.options().max_steps {
                debug!("{:#x}: more than {} match steps", self.address, lang.options().max_steps);
                return Err(Error::Failed(start));
            }

            let context = self.context.clone();
            let nodes = self.nodes.len();
            let commits = self.commits.len();
            match self.resolve(table, index, ctor, start, depth) {
                Ok(node) => {
                    trace!(
                        "{:#x}+{start}: {}[{index}]",
                        self.address,
                        lang.sla().tables[table as usize].name
                    );
                    return Ok(node);
                }
                Err(err) => {
                    self.context = context;
                    self.nodes.truncate(nodes);
                    self.commits.truncate(commits);
                    if let Error::More(len) = err {
                        needed = needed.max(Some(len));
                    }
                }
            }
        }
        Err(match needed {
            Some(len) => Error::More(len),
            None => Error::Failed(start),
        })
    }

    fn resolve(
        &mut self,
        table: u32,
        index: u32,
        ctor: &ConstructorDef,
        start: usize,
        depth: usize,
    ) -> Result<usize, Error> {
        let lang = self.lang;
        let sla = lang.sla();

        for change in &ctor.context_changes {
            let env = Env {
                lang,
                data: self.data,
                start,
                context: &self.context,
                inst_start: self.address,
                inst_next: 0,
                operands: &[],
            };
            let value = env.eval(&change.value)? as u32;
            self.context.set(&sla.context_fields[change.field as usize], value);
            if change.commit {
                self.commits.push((change.field, value));
            }
        }

        let node = self.nodes.len();
        self.nodes.push(Node {
            table,
            ctor: index,
            start,
            length: 0,
            operands: Vec::new(),
            context: self.context.clone(),
        });

        let mut operands: Vec<Operand> = Vec::with_capacity(ctor.operands.len());
        let mut end = start + ctor.length as usize;
        for def in &ctor.operands {
            let offset = def.offset.rel as usize;
            let op_start = match def.offset.base {
                Some(base) => operands[base as usize].end() + offset,
                None => start + offset,
            };
            let (length, value) = match &def.kind {
                OperandKind::Field(field) => {
                    let (raw, value) = read_field(lang, *field, self.data, op_start)?;
                    let def = &sla.fields[*field as usize];
                    // no attached entry, invalid encoding
                    if !def.attach.has_entry(raw) {
                        return Err(Error::Failed(start));
                    }
                    let token = def.token;
                    (sla.tokens[token as usize].size as usize, Value::Int { raw, value })
                }
                OperandKind::Context(field) => {
                    let def = &sla.context_fields[*field as usize];
                    let raw = self.context.get(def) as u64;
                    let value = self.context.value(def);
                    (0, Value::Int { raw, value })
                }
                OperandKind::Table(sub) => {
                    let child = self.match_table(*sub, op_start, depth + 1)?;
                    (self.nodes[child].length, Value::Node(child))
                }
                // evaluated once the instruction length is known
                OperandKind::Expr(_) => (0, Value::Int { raw: 0, value: 0 }),
            };
            let operand = Operand {
                start: op_start,
                length,
                value,
            };
            end = end.max(operand.end());
            operands.push(operand);
        }

        if end > lang.options().max_insn_len {
            return Err(Error::Failed(start));
        }

        let node_ref = &mut self.nodes[node];
        node_ref.length = end - start;
        node_ref.operands = operands;
        Ok(node)
    }

    fn resolve_expressions(&mut self, inst_next: u64) -> Result<(), Error> {
        let lang = self.lang;
        for i in 0..self.nodes.len() {
            let node = &self.nodes[i];
            let ctor = lang.constructor(node.table, node.ctor);
            let mut operands = node.operands.clone();
            for (k, def) in ctor.operands.iter().enumerate() {
                if let OperandKind::Expr(expr) = &def.kind {
                    let env = Env {
                        lang,
                        data: self.data,
                        start: node.start,
                        context: &node.context,
                        inst_start: self.address,
                        inst_next,
                        operands: &operands,
                    };
                    let value = env.eval(expr)?;
                    operands[k].value = Value::Int {
                        raw: value as u64,
                        value,
                    };
                }
            }
            self.nodes[i].operands = operands;
        }
        Ok(())
    }
}
