use crate::error::Result;
use crate::error::SizeMismatch;
use crate::error::UnknownSymbol;
use crate::symbols::Symbol;
use crate::symbols::SymbolKind;
use anyhow::Context as _;
use anyhow::bail;
use object::Endian as _;
use object::Endianness;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

/// The values to bake into a written copy of an object, keyed by symbol
/// name. Names are case-sensitive. An empty set of substitutions makes the
/// write a plain copy.
#[derive(Debug, Default, Clone)]
pub struct Substitutions {
    pub(crate) ints: BTreeMap<String, u32>,
    pub(crate) strings: BTreeMap<String, Vec<u8>>,
    pub(crate) ignored_prefixes: Vec<String>,
}

impl Substitutions {
    #[must_use]
    pub fn new() -> Substitutions {
        Substitutions::default()
    }

    /// Sets the integer to write over the data symbol `name`. The value is
    /// encoded in the object's byte order and narrowed to 16 bits when the
    /// symbol is declared 2 bytes wide.
    pub fn set_int(&mut self, name: impl Into<String>, value: u32) {
        self.ints.insert(name.into(), value);
    }

    /// Sets the bytes to write over the string symbol `name`. The value's
    /// length must equal the symbol's declared size or the write fails with
    /// [`SizeMismatch`].
    pub fn set_str(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.strings.insert(name.into(), value.into());
    }

    /// Marks symbols whose names start with `prefix` as intentionally
    /// unpatched: no substitution is required for them and no warning is
    /// emitted when they are skipped.
    pub fn ignore_prefix(&mut self, prefix: impl Into<String>) {
        self.ignored_prefixes.push(prefix.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.strings.is_empty()
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix))
    }
}

/// Copies `src` to `w` in full, then overwrites the substituted symbols'
/// bytes in place at their absolute offsets. Symbols the caller supplied no
/// value for keep their compiled bytes. Every supplied name must resolve to
/// a written symbol or the whole operation fails with [`UnknownSymbol`].
///
/// On failure the destination is left incomplete. Deleting it is the
/// caller's responsibility.
pub(crate) fn apply<W: Write + Seek>(
    w: &mut W,
    src: &[u8],
    endian: Endianness,
    symbols: &[Symbol],
    options: &Substitutions,
) -> Result {
    // The destination always starts as a byte-identical clone of the
    // source. With nothing to substitute, that's the whole job.
    w.write_all(src)?;
    if options.is_empty() {
        return Ok(());
    }

    let mut processed = HashSet::new();

    for symbol in symbols {
        let Some(value) = resolve_value(symbol, endian, options)? else {
            if !options.is_ignored(&symbol.name) {
                tracing::warn!(symbol = %symbol.name, "Skipping symbol substitution");
            }
            continue;
        };

        write_value(w, symbol.offset, &value)
            .with_context(|| format!("Failed to substitute symbol `{}`", symbol.name))?;
        if let Some(btf_offset) = symbol.btf_offset {
            write_value(w, btf_offset, &value)
                .with_context(|| format!("Failed to substitute BTF copy of `{}`", symbol.name))?;
        }

        processed.insert(symbol.name.as_str());
    }

    // A supplied name that didn't resolve to a written symbol fails the
    // whole write. String names are checked before integer names so the
    // reported name is stable when both kinds have leftovers.
    for name in options.strings.keys() {
        if !processed.contains(name.as_str()) {
            bail!(UnknownSymbol {
                name: name.clone(),
                kind: SymbolKind::String,
            });
        }
    }
    for name in options.ints.keys() {
        if !processed.contains(name.as_str()) {
            bail!(UnknownSymbol {
                name: name.clone(),
                kind: SymbolKind::Data,
            });
        }
    }

    Ok(())
}

/// Returns the encoded bytes to write for `symbol`, or None when the caller
/// supplied no value for it. Data symbols are only substitutable at sizes 4
/// and 2; other sizes resolve no value even when one was supplied.
fn resolve_value(
    symbol: &Symbol,
    endian: Endianness,
    options: &Substitutions,
) -> Result<Option<Vec<u8>>> {
    match symbol.kind {
        SymbolKind::Data => {
            let Some(&value) = options.ints.get(&symbol.name) else {
                return Ok(None);
            };
            Ok(match symbol.size {
                4 => Some(endian.write_u32_bytes(value).to_vec()),
                2 => Some(endian.write_u16_bytes(value as u16).to_vec()),
                _ => None,
            })
        }
        SymbolKind::String => {
            let Some(value) = options.strings.get(&symbol.name) else {
                return Ok(None);
            };
            if value.len() as u64 != symbol.size {
                bail!(SizeMismatch {
                    symbol: symbol.name.clone(),
                    expected: symbol.size,
                    actual: value.len(),
                });
            }
            Ok(Some(value.clone()))
        }
    }
}

fn write_value<W: Write + Seek>(w: &mut W, offset: u64, value: &[u8]) -> std::io::Result<()> {
    w.seek(SeekFrom::Start(offset))?;
    w.write_all(value)
}
