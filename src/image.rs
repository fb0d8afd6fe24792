use crate::{
    containers::Bytes,
    dir::{Dir, Walk},
    entry::{Entry, Stat},
    file::{File, OpenFlags},
    format, hashing,
    io::Source,
    Error, Result,
};
use bstr::BString;
#[cfg(feature = "mmap")]
use std::path::PathBuf;

/// Names the source of the image bytes for [`Image::bind`].
///
/// Exactly one source must be supplied: a pre-mapped base address (any byte
/// slice the caller keeps alive), or a partition path the binder will map
/// read-only itself.
#[derive(Default)]
pub struct Config<'bytes> {
    base: Option<&'bytes [u8]>,
    #[cfg(feature = "mmap")]
    partition: Option<PathBuf>,
}

impl<'bytes> Config<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn base_address(mut self, bytes: &'bytes [u8]) -> Self {
        self.base = Some(bytes);
        self
    }

    #[cfg(feature = "mmap")]
    #[must_use]
    pub fn partition<P>(mut self, path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.partition = Some(path.into());
        self
    }
}

/// A bound, validated image. All lookups, handles, and iterators borrow from
/// it; dropping the image releases the mapping if the binder owned one.
pub struct Image<'bytes> {
    bytes: Bytes<'bytes>,
    num_entries: u32,
    binary_len: u32,
    version: (u8, u8),
    root_child_count: u32,
}

impl<'bytes> Image<'bytes> {
    pub fn bind(config: Config<'bytes>) -> Result<Self> {
        let bytes = if let Some(base) = config.base {
            Bytes::from_borrowed(base)
        } else {
            Self::bind_partition(config)?
        };
        Self::from_container(bytes)
    }

    #[cfg(feature = "mmap")]
    fn bind_partition(config: Config<'bytes>) -> Result<Bytes<'bytes>> {
        let Some(path) = config.partition else {
            return Err(Error::ConfigMissing);
        };
        let file = std::fs::File::open(&path).map_err(Error::Bind)?;
        let mapping = unsafe { memmap2::Mmap::map(&file) }.map_err(Error::Bind)?;
        Ok(Bytes::from_mapped(mapping))
    }

    #[cfg(not(feature = "mmap"))]
    fn bind_partition(_config: Config<'bytes>) -> Result<Bytes<'bytes>> {
        Err(Error::ConfigMissing)
    }

    fn from_container(bytes: Bytes<'bytes>) -> Result<Self> {
        let (num_entries, binary_len, version, root_child_count) = {
            let image = bytes.as_bytes();
            if image.len() < format::HEADER_SIZE {
                return Err(Error::Truncated);
            }

            let mut source = Source::new(image);
            let magic: u32 = source.read()?;
            if magic != format::MAGIC {
                return Err(Error::InvalidMagic(magic));
            }

            let (major, minor, _reserved): (u8, u8, u16) = source.read()?;
            if major != format::VERSION_MAJOR {
                return Err(Error::VersionMismatch {
                    found: major,
                    expected: format::VERSION_MAJOR,
                });
            }
            if minor != format::VERSION_MINOR {
                // minor revisions stay readable
                log::debug!(
                    "image minor version {minor} differs from library minor {}",
                    format::VERSION_MINOR
                );
            }

            let (num_entries, binary_len): (u32, u32) = source.read()?;
            if num_entries == 0 {
                return Err(Error::Malformed("image has no entries"));
            }
            let len = binary_len as usize;
            if len < format::HEADER_SIZE || len > image.len() {
                return Err(Error::Truncated);
            }

            let table_len = (num_entries as usize)
                .checked_mul(format::HASH_ENTRY_SIZE)
                .ok_or(Error::Truncated)?;
            let root_offset = format::HEADER_SIZE
                .checked_add(table_len)
                .ok_or(Error::Truncated)?;
            if root_offset >= len {
                return Err(Error::Truncated);
            }

            let root = Entry::parse(&image[..len], root_offset)?;
            if !root.is_dir() || !root.is_root() || !root.name().is_empty() {
                return Err(Error::Malformed("first entry is not a root directory"));
            }

            (num_entries, binary_len, (major, minor), root.child_count())
        };

        log::debug!("bound image: {num_entries} entries, {binary_len} bytes");
        Ok(Self {
            bytes,
            num_entries,
            binary_len,
            version,
            root_child_count,
        })
    }

    /// Total entries in the image, files and directories both.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        self.num_entries
    }

    /// `(major, minor)` from the header.
    #[must_use]
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    #[must_use]
    pub fn root(&self) -> Entry<'_> {
        Entry::root(self.image(), self.root_offset(), self.root_child_count)
    }

    /// Resolves a path to its entry. Leading `/` are insignificant and the
    /// empty path names the root. A miss is `None`, never an error.
    #[must_use]
    pub fn resolve<P>(&self, path: P) -> Option<Entry<'_>>
    where
        P: AsRef<[u8]>,
    {
        let path = hashing::strip_root(path.as_ref());
        if path.is_empty() {
            return Some(self.root());
        }

        let hash = hashing::hash_path(path);
        let count = self.num_entries as usize;
        let mut index = self.search(hash)?;

        // the index permits tied hashes; rewind to the first, then check
        // every candidate by reconstructing its path
        while index > 0 && self.hash_entry_at(index - 1).0 == hash {
            index -= 1;
        }
        while index < count {
            let (candidate_hash, offset) = self.hash_entry_at(index);
            if candidate_hash != hash {
                break;
            }
            if let Ok(candidate) = Entry::parse(self.image(), offset as usize) {
                if self.full_path(&candidate) == path {
                    return Some(candidate);
                }
            }
            index += 1;
        }

        None
    }

    /// Reconstructs the full path of an entry by walking its parent links.
    /// The result carries no leading `/`; the root reconstructs as `""`.
    /// The walk is bounded by the entry count and the result by an internal
    /// path cap, so a malformed image cannot loop or balloon it.
    #[must_use]
    pub fn full_path(&self, entry: &Entry<'_>) -> BString {
        let mut segments = Vec::new();
        let mut current = *entry;
        let mut steps: u32 = 0;
        while !current.is_root() && steps <= self.num_entries {
            segments.push(current.name());
            steps += 1;
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        let mut path = BString::default();
        for segment in segments.iter().rev() {
            if !path.is_empty() {
                path.push(b'/');
            }
            path.extend_from_slice(segment);
            if path.len() > format::MAX_PATH {
                path.truncate(format::MAX_PATH);
                break;
            }
        }
        path
    }

    #[must_use]
    pub fn stat(&self, entry: &Entry<'_>) -> Stat {
        entry.stat()
    }

    /// Opens a file entry for streaming reads. Directories are rejected with
    /// [`Error::NotAFile`].
    pub fn open<'image>(
        &'image self,
        entry: &Entry<'image>,
        flags: OpenFlags,
    ) -> Result<File<'image>> {
        File::open(entry, flags)
    }

    /// Opens a directory for iteration; `None` opens the root. File entries
    /// are rejected with [`Error::NotADirectory`].
    pub fn open_dir<'image>(&'image self, entry: Option<&Entry<'image>>) -> Result<Dir<'image>> {
        match entry {
            Some(entry) => Dir::open(entry),
            None => Dir::open(&self.root()),
        }
    }

    /// Depth-first traversal over every entry below the root.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(self.root())
    }

    /// Optional integrity pass: the hash index must be sorted ascending and
    /// every indexed record must parse. Not run on bind; callers that do not
    /// trust their packer can run it once after binding.
    pub fn validate(&self) -> Result<()> {
        let mut previous: Option<u32> = None;
        for index in 0..self.num_entries as usize {
            let (hash, offset) = self.hash_entry_at(index);
            if previous.is_some_and(|prev| prev > hash) {
                return Err(Error::Malformed("hash index is not sorted"));
            }
            previous = Some(hash);
            Entry::parse(self.image(), offset as usize)?;
        }
        Ok(())
    }

    /// The image bytes the header vouches for.
    fn image(&self) -> &[u8] {
        &self.bytes.as_bytes()[..self.binary_len as usize]
    }

    fn root_offset(&self) -> usize {
        format::HEADER_SIZE + format::HASH_ENTRY_SIZE * self.num_entries as usize
    }

    /// Binary search for any index whose hash equals `hash`.
    fn search(&self, hash: u32) -> Option<usize> {
        let mut lo = 0usize;
        let mut hi = (self.num_entries as usize).checked_sub(1)?;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let (mid_hash, _) = self.hash_entry_at(mid);
            if mid_hash == hash {
                return Some(mid);
            }
            if mid_hash < hash {
                lo = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                hi = mid - 1;
            }
        }
        None
    }

    /// `(hash, offset)` at `index`. The table was bounds-checked at bind.
    fn hash_entry_at(&self, index: usize) -> (u32, u32) {
        let image = self.image();
        let start = format::HEADER_SIZE + format::HASH_ENTRY_SIZE * index;
        let word = |at: usize| {
            u32::from_le_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]])
        };
        (word(start), word(start + 4))
    }
}
