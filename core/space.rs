use alloc::string::String;

use crate::{flags::Flags, macros::impl_flag_checks, utils::byte_mask};

/// Storage class of an address space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    /// Immediate values, the offset is the value itself.
    Constant,
    /// Registers and memory of the processor.
    Processor,
    /// Instruction-local temporaries.
    Internal,
    /// Anything else the language declares, e.g. an overlay.
    Other,
}

impl SpaceKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Constant,
            1 => Self::Processor,
            2 => Self::Internal,
            3 => Self::Other,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Constant => 0,
            Self::Processor => 1,
            Self::Internal => 2,
            Self::Other => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AddressSpace {
    pub name: String,
    pub index: u32,
    pub kind: SpaceKind,
    /// Size of an address in bytes.
    pub address_size: u32,
    /// Number of bytes in an addressable unit.
    pub word_size: u32,
    pub flags: Flags,
    pub highest: u64,
    pub pointer_lower_bound: u64,
    pub pointer_upper_bound: u64,
    /// Index of the space this one overlays.
    pub overlay_base: Option<u32>,
}

impl AddressSpace {
    impl_flag_checks! {
        BIG_ENDIAN = 0x001, is_big_endian;
        HERITAGED = 0x002, is_heritaged;
        DOES_DEADCODE = 0x004, does_deadcode;
        PROGRAM_SPECIFIC = 0x008, is_program_specific;
        REVERSE_JUSTIFICATION = 0x010, is_reverse_justified;
        FORMAL_STACKSPACE = 0x020, is_formal_stackspace;
        OVERLAY = 0x040, is_overlay;
        OVERLAY_BASE = 0x080, is_overlay_base;
        TRUNCATED = 0x100, is_truncated;
        HAS_PHYSICAL = 0x200, has_physical;
        IS_OTHERSPACE = 0x400, is_otherspace;
        HAS_NEAR_POINTERS = 0x800, has_near_pointers;
    }

    pub fn new(name: &str, index: u32, kind: SpaceKind, address_size: u32, word_size: u32) -> Self {
        let word_size = word_size.max(1);
        let highest = byte_mask(address_size)
            .saturating_mul(word_size as u64)
            .saturating_add(word_size as u64 - 1);
        Self {
            name: name.into(),
            index,
            kind,
            address_size,
            word_size,
            flags: Flags::empty(),
            highest,
            pointer_lower_bound: 0,
            pointer_upper_bound: 0,
            overlay_base: None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.kind == SpaceKind::Constant
    }

    pub fn is_unique(&self) -> bool {
        self.kind == SpaceKind::Internal
    }

    /// Wrap `offset` into the addressable range of the space.
    pub fn wrap_offset(&self, offset: u64) -> u64 {
        if self.is_constant() || self.highest == u64::MAX {
            offset
        } else {
            offset % (self.highest + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest() {
        let ram = AddressSpace::new("ram", 2, SpaceKind::Processor, 2, 1);
        assert_eq!(ram.highest, 0xffff);
        assert_eq!(ram.wrap_offset(0x1_0002), 2);

        let wide = AddressSpace::new("code", 3, SpaceKind::Processor, 8, 2);
        assert_eq!(wide.highest, u64::MAX);
    }

    #[test]
    fn flags() {
        let mut space = AddressSpace::new("register", 1, SpaceKind::Processor, 4, 1);
        space
            .flags
            .set(AddressSpace::BIG_ENDIAN | AddressSpace::HAS_PHYSICAL);
        assert!(space.is_big_endian());
        assert!(space.has_physical());
        assert!(!space.is_overlay());
    }
}
