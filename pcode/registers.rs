use alloc::{collections::BTreeMap, string::String, vec::Vec};

use pcode_core::{sla::Sla, Varnode};

use crate::spaces::Spaces;

/// A named storage location declared by the language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterInfo {
    pub varnode: Varnode,
    pub name: String,
}

/// Exact-range index between registers and their names.
#[derive(Debug, Default)]
pub struct RegisterTable {
    list: Vec<RegisterInfo>,
    by_name: BTreeMap<String, usize>,
    by_range: BTreeMap<(u32, u64, i32), usize>,
}

impl RegisterTable {
    pub(crate) fn new(sla: &Sla, spaces: &Spaces) -> Self {
        let mut table = Self::default();
        for def in &sla.registers {
            let space = match spaces.get(def.space as usize) {
                Some(space) => space,
                None => continue,
            };
            let index = table.list.len();
            let varnode = Varnode::new(space.clone(), def.offset, def.size as i32);
            table.by_name.insert(def.name.clone(), index);
            // first declaration wins for aliased ranges
            table
                .by_range
                .entry((def.space, def.offset, def.size as i32))
                .or_insert(index);
            table.list.push(RegisterInfo {
                varnode,
                name: def.name.clone(),
            });
        }
        table
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Registers in declaration order.
    pub fn all(&self) -> &[RegisterInfo] {
        &self.list
    }

    pub fn get(&self, index: usize) -> Option<&RegisterInfo> {
        self.list.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&RegisterInfo> {
        self.by_name.get(name).map(|&i| &self.list[i])
    }

    pub fn name_of(&self, space: u32, offset: u64, size: i32) -> Option<&str> {
        self.by_range
            .get(&(space, offset, size))
            .map(|&i| self.list[i].name.as_str())
    }
}
