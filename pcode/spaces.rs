use alloc::{sync::Arc, vec::Vec};

use pcode_core::{
    sla::Sla,
    space::{AddressSpace, SpaceKind},
    Varnode,
};

use crate::Error;

/// Address spaces of a language, indexed by name and by number.
#[derive(Debug)]
pub struct Spaces {
    list: Vec<Arc<AddressSpace>>,
    constant: usize,
    unique: usize,
    default: usize,
}

impl Spaces {
    /// The blob must already be validated.
    pub(crate) fn new(sla: &Sla) -> Self {
        let list = sla
            .spaces
            .iter()
            .enumerate()
            .map(|(index, def)| {
                let mut space = AddressSpace::new(
                    &def.name,
                    index as u32,
                    def.kind,
                    def.address_size,
                    def.word_size,
                );
                space.flags.set(def.flags);
                space.pointer_lower_bound = def.pointer_lower_bound;
                space.pointer_upper_bound = def.pointer_upper_bound;
                space.overlay_base = def.overlay_base;
                Arc::new(space)
            })
            .collect::<Vec<_>>();

        let find = |kind| {
            list.iter()
                .position(|i: &Arc<AddressSpace>| i.kind == kind)
                .unwrap_or(0)
        };

        Self {
            constant: find(SpaceKind::Constant),
            unique: find(SpaceKind::Internal),
            default: sla.default_space as usize,
            list,
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AddressSpace>> {
        self.list.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<AddressSpace>> {
        self.list.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<AddressSpace>> {
        self.list.iter().find(|i| i.name == name)
    }

    pub fn resolve_index(&self, index: usize) -> Result<&Arc<AddressSpace>, Error> {
        self.get(index).ok_or(Error::UnknownSpace)
    }

    pub fn resolve(&self, name: &str) -> Result<&Arc<AddressSpace>, Error> {
        self.by_name(name).ok_or(Error::UnknownSpace)
    }

    pub fn constant(&self) -> &Arc<AddressSpace> {
        &self.list[self.constant]
    }

    pub fn unique(&self) -> &Arc<AddressSpace> {
        &self.list[self.unique]
    }

    pub fn default_space(&self) -> &Arc<AddressSpace> {
        &self.list[self.default]
    }

    /// Space named by the constant space-id input of LOAD and STORE.
    pub fn space_from_const(&self, vn: &Varnode) -> Option<&Arc<AddressSpace>> {
        if vn.is_constant() {
            self.get(vn.offset as usize)
        } else {
            None
        }
    }

    pub(crate) fn constant_varnode(&self, value: u64, size: i32) -> Varnode {
        Varnode::new(self.constant().clone(), value, size)
    }
}
