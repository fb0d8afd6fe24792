use crate::{
    format::{self, Compression},
    io::Source,
    Error, Result,
};
use bstr::BStr;
use core::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Directory,
    File,
}

/// The record metadata surfaced by a stat call. Sizes are zero for
/// directories; for compressed files `len` is the decompressed length and
/// `stored_len` the on-image length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Stat {
    pub kind: Kind,
    pub compression: Option<Compression>,
    pub len: u32,
    pub stored_len: u32,
}

#[derive(Clone, Copy)]
pub(crate) enum Body {
    Directory {
        child_count: u32,
    },
    File {
        data_len: u32,
        data_offs: u32,
        decompressed: Option<(u32, u16)>,
    },
}

/// A parsed view of one record, borrowing the image it came from. Copying
/// an entry never copies image bytes.
#[derive(Clone, Copy)]
pub struct Entry<'image> {
    image: &'image [u8],
    offset: usize,
    compression: u8,
    parent: u32,
    name: &'image BStr,
    body: Body,
}

impl<'image> Entry<'image> {
    /// Parses the record at `offset`, validating alignment, bounds, and the
    /// payload range before anything downstream trusts them.
    pub(crate) fn parse(image: &'image [u8], offset: usize) -> Result<Self> {
        if offset % format::ALIGNMENT != 0 {
            return Err(Error::Malformed("unaligned entry record"));
        }

        let mut source = Source::new(image);
        source.seek_absolute(offset)?;
        let (type_tag, compression, seg_len, parent): (u8, u8, u16, u32) = source.read()?;

        let body = match type_tag {
            format::TYPE_DIR => {
                let child_count: u32 = source.read()?;
                let table_len = (child_count as usize)
                    .checked_mul(4)
                    .ok_or(Error::Truncated)?;
                source.read_bytes(table_len)?;
                Body::Directory { child_count }
            }
            format::TYPE_FILE => {
                let (data_len, data_offs): (u32, u32) = source.read()?;
                let decompressed = if compression == format::COMPRESSION_NONE {
                    None
                } else {
                    let fields: (u32, u16) = source.read()?;
                    Some(fields)
                };
                let stop = (data_offs as usize)
                    .checked_add(data_len as usize)
                    .ok_or(Error::Truncated)?;
                if stop > image.len() {
                    return Err(Error::Malformed("file payload out of bounds"));
                }
                Body::File {
                    data_len,
                    data_offs,
                    decompressed,
                }
            }
            _ => return Err(Error::Malformed("unrecognized entry type")),
        };

        let name = source.read_bytes(usize::from(seg_len) + 1)?;
        if name[usize::from(seg_len)] != 0 {
            return Err(Error::Malformed("unterminated entry name"));
        }
        let name = &name[..usize::from(seg_len)];

        Ok(Self {
            image,
            offset,
            compression,
            parent,
            name: BStr::new(name),
            body,
        })
    }

    /// Rebuilds the root view from fields the binder validated once. The
    /// root always has an empty name, no parent, and no compression.
    #[must_use]
    pub(crate) fn root(image: &'image [u8], offset: usize, child_count: u32) -> Self {
        Self {
            image,
            offset,
            compression: format::COMPRESSION_NONE,
            parent: 0,
            name: BStr::new(b""),
            body: Body::Directory { child_count },
        }
    }

    /// The final path segment. Empty for the root.
    #[must_use]
    pub fn name(&self) -> &'image BStr {
        self.name
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match self.body {
            Body::Directory { .. } => Kind::Directory,
            Body::File { .. } => Kind::File,
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind() == Kind::Directory
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind() == Kind::File
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.is_file() && self.compression != format::COMPRESSION_NONE
    }

    /// `None` when the stored tag is not one this build recognizes.
    #[must_use]
    pub fn compression(&self) -> Option<Compression> {
        Compression::from_raw(self.compression)
    }

    #[must_use]
    pub(crate) fn compression_tag(&self) -> u8 {
        self.compression
    }

    /// The parent directory, or `None` for the root. A parent offset that no
    /// longer parses also yields `None`; reconstruction treats that as a
    /// dead end rather than a fatal error.
    #[must_use]
    pub fn parent(&self) -> Option<Entry<'image>> {
        match self.parent {
            0 => None,
            offset => Self::parse(self.image, offset as usize).ok(),
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent == 0
    }

    /// Logical length: the decompressed size for compressed files, the
    /// payload size otherwise, zero for directories.
    #[must_use]
    pub fn len(&self) -> u32 {
        match self.body {
            Body::Directory { .. } => 0,
            Body::File {
                data_len,
                decompressed,
                ..
            } => decompressed.map_or(data_len, |(len, _)| len),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes the file occupies in the image, before decompression.
    #[must_use]
    pub fn stored_len(&self) -> u32 {
        match self.body {
            Body::Directory { .. } => 0,
            Body::File { data_len, .. } => data_len,
        }
    }

    #[must_use]
    pub fn stat(&self) -> Stat {
        Stat {
            kind: self.kind(),
            compression: self.compression(),
            len: self.len(),
            stored_len: self.stored_len(),
        }
    }

    /// The stored payload slice. `None` for directories. Bounds were
    /// validated at parse time.
    #[must_use]
    pub(crate) fn data(&self) -> Option<&'image [u8]> {
        match self.body {
            Body::Directory { .. } => None,
            Body::File {
                data_len,
                data_offs,
                ..
            } => {
                let start = data_offs as usize;
                Some(&self.image[start..start + data_len as usize])
            }
        }
    }

    #[must_use]
    pub(crate) fn decompressed_fields(&self) -> Option<(u32, u16)> {
        match self.body {
            Body::Directory { .. } => None,
            Body::File { decompressed, .. } => decompressed,
        }
    }

    #[must_use]
    pub(crate) fn child_count(&self) -> u32 {
        match self.body {
            Body::Directory { child_count } => child_count,
            Body::File { .. } => 0,
        }
    }

    /// Offset of the child-offset table. Only meaningful for directories.
    #[must_use]
    fn children_offset(&self) -> usize {
        self.offset + 0xC
    }

    #[must_use]
    pub(crate) fn child(&self, index: u32) -> Option<Entry<'image>> {
        if index >= self.child_count() {
            return None;
        }
        let mut source = Source::new(self.image);
        source
            .seek_absolute(self.children_offset() + 4 * index as usize)
            .ok()?;
        let offset: u32 = source.read().ok()?;
        Self::parse(self.image, offset as usize).ok()
    }
}

impl<'image> PartialEq for Entry<'image> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.image.as_ptr(), other.image.as_ptr()) && self.offset == other.offset
    }
}

impl<'image> Eq for Entry<'image> {}

impl<'image> fmt::Debug for Entry<'image> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("offset", &self.offset)
            .field("kind", &self.kind())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
