pub(crate) mod elf;
pub mod error;
pub(crate) mod substitute;
pub(crate) mod symbols;
pub(crate) mod template;

pub use crate::error::Result;
pub use crate::error::SizeMismatch;
pub use crate::error::UnknownSymbol;
pub use crate::error::UnsupportedMachine;
pub use crate::substitute::Substitutions;
pub use crate::symbols::Symbol;
pub use crate::symbols::SymbolKind;
pub use crate::template::Template;
pub use object::Endianness;
