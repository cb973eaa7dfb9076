//! Built-in languages.

#[cfg(feature = "toy")]
pub mod toy {
    pub use pcode_toy::*;
}

#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
    #[cfg(feature = "toy")]
    Toy,
}

impl Arch {
    const ALL: &'static [Arch] = &[
        #[cfg(feature = "toy")]
        Arch::Toy,
    ];

    /// Languages compiled into the crate.
    pub fn all() -> &'static [Arch] {
        Self::ALL
    }

    /// Look a language up by id, ignoring case.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.id().eq_ignore_ascii_case(id))
    }

    pub fn id(&self) -> &'static str {
        match *self {
            #[cfg(feature = "toy")]
            Arch::Toy => toy::LANGUAGE_ID,
        }
    }

    pub fn description(&self) -> &'static str {
        match *self {
            #[cfg(feature = "toy")]
            Arch::Toy => toy::DESCRIPTION,
        }
    }

    /// Compiled language description.
    pub fn sla(&self) -> &'static [u8] {
        match *self {
            #[cfg(feature = "toy")]
            Arch::Toy => toy::SLA,
        }
    }

    /// Context values applied when an engine is created for the language.
    pub fn context_defaults(&self) -> &'static [(&'static str, u32)] {
        match *self {
            #[cfg(feature = "toy")]
            Arch::Toy => toy::CONTEXT_DEFAULTS,
        }
    }
}
