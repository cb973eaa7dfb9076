/// Declares a closed opcode enumeration with a fixed numeric encoding and
/// a display name per opcode.
#[macro_export]
macro_rules! define_opcodes {
    ($(#[$attr:meta])* $vis:vis enum $name:ident {
        $($(#[$op_attr:meta])* $op:ident = $n:literal => $mnemonic:literal),+ $(,)?
    }) => (
        #[repr(u32)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $(#[$attr])*
        $vis enum $name {
            $($(#[$op_attr])* $op = $n),+
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value as u32
            }
        }

        impl $name {
            /// Every opcode in numeric order.
            pub const ALL: &'static [$name] = &[$($name::$op),+];

            pub fn from_u32(value: u32) -> Option<Self> {
                Some(match value {
                    $($n => Self::$op,)+
                    _ => return None,
                })
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$op => $mnemonic,)+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                Some(match name {
                    $($mnemonic => Self::$op,)+
                    _ => return None,
                })
            }
        }
    );
}
pub use define_opcodes;

/// Declares named bit constants plus a predicate method per bit.
#[macro_export]
macro_rules! impl_flag_checks {
    ($($(#[$attr:meta])* $name:ident = $bit:expr, $check:ident;)*) => (
        $(
            $(#[$attr])*
            pub const $name: u32 = $bit;
        )*

        $(
            #[inline]
            pub fn $check(&self) -> bool {
                self.flags.any(Self::$name)
            }
        )*
    );
}
pub use impl_flag_checks;
