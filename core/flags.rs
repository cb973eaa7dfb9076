use crate::utils::{deposit, zextract};

/// A bit range inside a 32-bit word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Field {
    start: u8,
    size: u8,
}

impl Field {
    pub const fn new(start: u8, size: u8) -> Self {
        debug_assert!(size != 0 && start < 32 && (start + size) <= 32);
        Self { start, size }
    }

    /// Field spanning the inclusive bit range `lsb..=msb`.
    pub const fn from_bits(lsb: u32, msb: u32) -> Self {
        Self::new(lsb as u8, (msb - lsb + 1) as u8)
    }

    pub const fn start(&self) -> u32 {
        self.start as u32
    }

    pub const fn size(&self) -> u32 {
        self.size as u32
    }

    /// Largest value the field can hold.
    pub const fn max(&self) -> u32 {
        if self.size >= 32 {
            u32::MAX
        } else {
            (1 << self.size) - 1
        }
    }

    pub fn get(&self, raw: u32) -> u32 {
        zextract(raw, self.start(), self.size())
    }

    pub fn set(&self, raw: u32, value: u32) -> u32 {
        deposit(raw, self.start(), self.size(), value)
    }
}

#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash)]
pub struct Flags {
    raw: u32,
}

impl Flags {
    pub const fn empty() -> Self {
        Self { raw: 0 }
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    pub const fn raw(&self) -> u32 {
        self.raw
    }

    pub fn clear(&mut self, flags: u32) -> &mut Self {
        self.raw &= !flags;
        self
    }

    pub fn set(&mut self, flags: u32) -> &mut Self {
        self.raw |= flags;
        self
    }

    pub fn set_if(&mut self, flags: u32, cond: bool) -> &mut Self {
        if cond {
            self.raw |= flags;
        } else {
            self.raw &= !flags;
        }
        self
    }

    pub fn any(&self, flags: u32) -> bool {
        self.raw & flags != 0
    }

    pub fn all(&self, flags: u32) -> bool {
        self.raw & flags == flags
    }

    pub fn field(&self, field: Field) -> u32 {
        field.get(self.raw)
    }

    pub fn field_set(&mut self, field: Field, value: u32) -> &mut Self {
        self.raw = field.set(self.raw, value);
        self
    }
}
