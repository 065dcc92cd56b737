use crate::elf::ParsedObject;
use crate::error::Result;
use crate::substitute;
use crate::substitute::Substitutions;
use crate::symbols::Symbol;
use crate::symbols::Symbols;
use anyhow::Context;
use memmap2::Mmap;
use object::Endianness;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

/// An in-memory representation of a BPF ELF object, opened for templating.
///
/// The symbol table is extracted once at construction and never changes.
/// [`Template::write_to`] produces patched copies of the object without
/// mutating the source, so one handle can serve any number of writes.
pub struct Template {
    endian: Endianness,
    machine: u16,
    source: Source,
    symbols: Symbols,

    // Serializes writes of the object. Concurrent writes to distinct paths
    // wouldn't be far from workable, but it's just not supported for now.
    write_lock: Mutex<()>,
}

enum Source {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Source {
    fn bytes(&self) -> &[u8] {
        match self {
            Source::Mapped(mmap) => mmap,
            Source::Owned(bytes) => bytes,
        }
    }
}

impl Template {
    /// Opens and parses the object file at `path`.
    ///
    /// The file is mapped rather than read, so it must not be modified for
    /// as long as the handle lives. The mapping is released when the handle
    /// is dropped.
    pub fn open(path: impl AsRef<Path>) -> Result<Template> {
        let path = path.as_ref();

        let file = File::open(path)
            .with_context(|| format!("Failed to open object file `{}`", path.display()))?;

        // Safety: this is only sound if the file isn't truncated or
        // rewritten while we have it mapped. The objects being templated
        // are build artifacts that nothing is expected to touch between
        // compilation and load, so we accept that in exchange for not
        // copying every object we open.
        let bytes = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to mmap object file `{}`", path.display()))?;

        Template::from_source(Source::Mapped(bytes))
            .with_context(|| format!("Failed to parse object file `{}`", path.display()))
    }

    /// Constructs a handle from an object already held in memory.
    ///
    /// The object is expected to start at position 0 of `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Template> {
        Template::from_source(Source::Owned(bytes))
    }

    fn from_source(source: Source) -> Result<Template> {
        let object = ParsedObject::parse(source.bytes())?;
        let symbols = Symbols::extract_from(&object).context("Unable to read ELF symbols")?;
        let endian = object.endian;
        let machine = object.machine;

        Ok(Template {
            endian,
            machine,
            source,
            symbols,
            write_lock: Mutex::new(()),
        })
    }

    /// The substitutable symbols of the object, sorted by name.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        self.symbols.as_slice()
    }

    /// Looks up a substitutable symbol by name.
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// The object's byte order. Substituted integers are encoded in this
    /// order.
    #[must_use]
    pub fn endianness(&self) -> Endianness {
        self.endian
    }

    /// The machine tag from the object's file header.
    #[must_use]
    pub fn machine(&self) -> u16 {
        self.machine
    }

    /// Writes a copy of the object to a new file at `path`, with the
    /// supplied substitutions baked in at their symbols' offsets.
    ///
    /// On success, the file's contents have been synced to storage. On
    /// failure, no file is left behind at `path`, with one exception: when
    /// everything was written but the final sync failed, the complete but
    /// possibly non-durable file stays in place. Callers should treat that
    /// case as a failed write all the same.
    ///
    /// Writes on the same handle are serialized; a concurrent caller blocks
    /// until the write in flight finishes.
    pub fn write_to(&self, path: impl AsRef<Path>, options: &Substitutions) -> Result {
        let path = path.as_ref();
        let _guard = self.write_lock.lock().unwrap();

        let mut file = File::create(path)
            .with_context(|| format!("Failed to create object file `{}`", path.display()))?;

        if let Err(error) = substitute::apply(
            &mut file,
            self.source.bytes(),
            self.endian,
            self.symbols.as_slice(),
            options,
        ) {
            drop(file);
            if let Err(remove_error) = std::fs::remove_file(path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %remove_error,
                    "Failed to remove partially written object"
                );
            }
            return Err(
                error.context(format!("Failed to write object file `{}`", path.display()))
            );
        }

        // The content is fully written at this point, so an unsynced file is
        // complete, just not guaranteed durable. Leave it in place.
        file.sync_all()
            .with_context(|| format!("Failed to sync object file `{}`", path.display()))?;

        tracing::debug!(path = %path.display(), "Finished writing object");
        Ok(())
    }
}
