use crate::symbols::SymbolKind;
use std::fmt::Display;

pub(crate) use anyhow::Error;

pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// An error indicating that the input object's machine tag is not one we can
/// substitute symbols in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedMachine(pub u16);

/// An error indicating that a string substitution value didn't have the same
/// length as the symbol it was meant to replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeMismatch {
    /// Name of the symbol being substituted.
    pub symbol: String,
    /// The symbol's declared size in the object.
    pub expected: u64,
    /// Length of the supplied substitution value.
    pub actual: usize,
}

/// An error indicating that a substitution was supplied for a symbol that
/// doesn't exist in the object, or exists but isn't substitutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSymbol {
    /// The option key that failed to resolve.
    pub name: String,
    /// Which kind of substitution named it.
    pub kind: SymbolKind,
}

impl Display for UnsupportedMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported ELF machine type {:#x}", self.0)
    }
}

impl Display for SizeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "substitution value for `{}` is {} bytes, but the symbol is {} bytes",
            self.symbol, self.actual, self.expected
        )
    }
}

impl Display for UnknownSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            SymbolKind::Data => write!(f, "no data symbol `{}` in object", self.name),
            SymbolKind::String => write!(f, "no string symbol `{}` in object", self.name),
        }
    }
}

impl core::error::Error for UnsupportedMachine {}
impl core::error::Error for SizeMismatch {}
impl core::error::Error for UnknownSymbol {}
