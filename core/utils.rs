use core::mem;

pub trait ZExtract<U>: Sized {
    fn zextract(&self, pos: u32, len: u32) -> U;
}

pub trait SExtract<S>: Sized {
    fn sextract(&self, pos: u32, len: u32) -> S;
}

macro_rules! impl_extract {
    ($($uint:ty = $sint:ty),+ $(,)?) => (
        $(
            impl ZExtract<$uint> for $uint {
                fn zextract(&self, pos: u32, len: u32) -> $uint {
                    let w = mem::size_of::<$uint>() as u32 * 8;
                    debug_assert!(len != 0 && pos + len <= w);
                    (*self << (w - pos - len)) >> (w - len)
                }
            }

            impl SExtract<$sint> for $uint {
                fn sextract(&self, pos: u32, len: u32) -> $sint {
                    let w = mem::size_of::<$uint>() as u32 * 8;
                    debug_assert!(len != 0 && pos + len <= w);
                    (*self << (w - pos - len)) as $sint >> (w - len)
                }
            }
        )+
    );
}

impl_extract! {
    u32 = i32,
    u64 = i64,
}

pub fn zextract<U, T: ZExtract<U>>(value: T, pos: u32, len: u32) -> U {
    value.zextract(pos, len)
}

pub fn sextract<S, T: SExtract<S>>(value: T, pos: u32, len: u32) -> S {
    value.sextract(pos, len)
}

pub trait Deposit: Sized {
    fn deposit<F: Into<Self>>(&self, pos: u32, len: u32, field: F) -> Self;
}

macro_rules! impl_deposit {
    ($($uint:ty),+ $(,)?) => {
        $(
            impl Deposit for $uint {
                fn deposit<F: Into<Self>>(&self, pos: u32, len: u32, field: F) -> Self {
                    let w = mem::size_of::<$uint>() as u32 * 8;
                    let mask = if len >= w {
                        <$uint>::MAX
                    } else {
                        ((1 as $uint << len) - 1) << pos
                    };
                    (*self & !mask) | ((field.into() << pos) & mask)
                }
            }
         )+
    };
}

impl_deposit!(u32, u64);

pub fn deposit<T: Deposit, F: Into<T>>(value: T, pos: u32, len: u32, field: F) -> T {
    value.deposit(pos, len, field)
}

/// Mask covering `size` bytes, saturating at 64 bits.
pub const fn byte_mask(size: u32) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1 << (size * 8)) - 1
    }
}

/// Truncate `value` to `size` bytes.
pub const fn truncate(value: u64, size: u32) -> u64 {
    value & byte_mask(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract() {
        assert_eq!(zextract::<u32, _>(0xabcd_u32, 4, 8), 0xbc);
        assert_eq!(sextract::<i32, _>(0x0f00_u32, 8, 4), -1);
        assert_eq!(sextract::<i64, _>(0x7f_u64, 0, 8), 0x7f);
        assert_eq!(zextract::<u64, _>(u64::MAX, 0, 64), u64::MAX);
    }

    #[test]
    fn deposit_full_width() {
        assert_eq!(deposit(0_u32, 0, 32, 0xdead_beef_u32), 0xdead_beef);
        assert_eq!(deposit(0xff_u32, 4, 2, 0_u32), 0xcf);
    }

    #[test]
    fn masks() {
        assert_eq!(byte_mask(2), 0xffff);
        assert_eq!(byte_mask(8), u64::MAX);
        assert_eq!(truncate(0x1_2345, 2), 0x2345);
    }
}
