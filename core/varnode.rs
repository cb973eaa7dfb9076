use alloc::sync::Arc;
use core::hash::{Hash, Hasher};

use crate::space::AddressSpace;

/// A storage location: space, offset and size in bytes.
#[derive(Clone, Debug)]
pub struct Varnode {
    pub space: Arc<AddressSpace>,
    pub offset: u64,
    /// Signed so that [`Varnode::UNSPECIFIED_SIZE`] can be represented.
    pub size: i32,
}

impl Varnode {
    pub const UNSPECIFIED_SIZE: i32 = -1;

    pub fn new(space: Arc<AddressSpace>, offset: u64, size: i32) -> Self {
        Self {
            space,
            offset,
            size,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.space.is_constant()
    }

    pub fn is_unique(&self) -> bool {
        self.space.is_unique()
    }

    /// Returns `true` if both varnodes name exactly the same bytes.
    pub fn same_range(&self, space: &AddressSpace, offset: u64, size: i32) -> bool {
        self.space.index == space.index && self.offset == offset && self.size == size
    }
}

impl PartialEq for Varnode {
    fn eq(&self, other: &Self) -> bool {
        self.space.index == other.space.index
            && self.space.name == other.space.name
            && self.offset == other.offset
            && self.size == other.size
    }
}

impl Eq for Varnode {}

impl Hash for Varnode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.space.index.hash(state);
        self.offset.hash(state);
        self.size.hash(state);
    }
}
