// Bit layouts for the `init` and `open` flag words shared with embedding hosts.
use crate::core::error::{Error, ErrorKind};

pub const INIT_LOAD_FILE: u32 = 0x0001;
pub const INIT_LOAD_STRING: u32 = 0x0002;
pub const INIT_JSON_MANIFEST: u32 = 0x0010;
pub const INIT_JSON_MAIN: u32 = 0x0020;

pub const OPEN_WRITE: u32 = 0x0001;
pub const OPEN_KIND_MASK: u32 = 0x0F00;
pub const OPEN_INTERFACE: u32 = 0x0100;
pub const OPEN_FS: u32 = 0x0200;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ManifestSource {
    File,
    Inline,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ManifestShape {
    /// A generic document carrying a `libcordis` section.
    Namespaced,
    /// The `libcordis` section itself.
    Bare,
}

/// Decoded `init` flags. File wins over inline and namespaced wins over bare when both
/// bits are set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InitFlags {
    pub source: ManifestSource,
    pub shape: ManifestShape,
}

impl InitFlags {
    pub fn new(source: ManifestSource, shape: ManifestShape) -> Self {
        Self { source, shape }
    }

    pub fn from_bits(bits: u32) -> Result<Self, Error> {
        let source = if bits & INIT_LOAD_FILE != 0 {
            ManifestSource::File
        } else if bits & INIT_LOAD_STRING != 0 {
            ManifestSource::Inline
        } else {
            return Err(Error::new(ErrorKind::InvalidFlags).with_message("no manifest source bit"));
        };
        let shape = if bits & INIT_JSON_MANIFEST != 0 {
            ManifestShape::Namespaced
        } else if bits & INIT_JSON_MAIN != 0 {
            ManifestShape::Bare
        } else {
            return Err(Error::new(ErrorKind::InvalidFlags).with_message("no manifest shape bit"));
        };
        Ok(Self { source, shape })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READ: Self = Self(0);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn with_write(self) -> Self {
        Self(self.0 | OPEN_WRITE)
    }

    pub fn with_kind(self, kind: u32) -> Self {
        Self((self.0 & !OPEN_KIND_MASK) | (kind & OPEN_KIND_MASK))
    }

    pub fn write(self) -> bool {
        self.0 & OPEN_WRITE != 0
    }

    fn kind(self) -> u32 {
        self.0 & OPEN_KIND_MASK
    }

    /// True when no kind is requested or the mask includes interface-backed results.
    pub fn allows_interface(self) -> bool {
        self.kind() == 0 || self.kind() & OPEN_INTERFACE != 0
    }

    pub fn allows_fs(self) -> bool {
        self.kind() == 0 || self.kind() & OPEN_FS != 0
    }
}
