//! Test-only image packer. Builds bit-exact images in memory so the tests
//! can exercise binding, lookup, and the streaming drivers without fixture
//! files on disk.

use crate::{format, hashing};
use bstr::BString;

pub(crate) struct ImageBuilder {
    nodes: Vec<Node>,
    trailer: bool,
}

struct Node {
    name: BString,
    parent: usize,
    kind: NodeKind,
}

enum NodeKind {
    Dir {
        children: Vec<usize>,
    },
    File {
        stored: Vec<u8>,
        tag: u8,
        decompressed: Option<(u32, u16)>,
    },
}

impl ImageBuilder {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: BString::default(),
                parent: 0,
                kind: NodeKind::Dir {
                    children: Vec::new(),
                },
            }],
            trailer: false,
        }
    }

    /// Adds a directory. Parent directories must already exist.
    pub(crate) fn dir(&mut self, path: &str) -> &mut Self {
        self.insert(
            path,
            NodeKind::Dir {
                children: Vec::new(),
            },
        );
        self
    }

    /// Adds an uncompressed file.
    pub(crate) fn file(&mut self, path: &str, data: &[u8]) -> &mut Self {
        self.insert(
            path,
            NodeKind::File {
                stored: data.to_vec(),
                tag: format::COMPRESSION_NONE,
                decompressed: None,
            },
        );
        self
    }

    /// Adds a file with a caller-chosen compression tag and stored bytes,
    /// for exercising odd or unknown tags.
    pub(crate) fn file_stored(
        &mut self,
        path: &str,
        stored: &[u8],
        tag: u8,
        decompressed_len: u32,
        params: u16,
    ) -> &mut Self {
        assert_ne!(tag, format::COMPRESSION_NONE, "plain files use file()");
        self.insert(
            path,
            NodeKind::File {
                stored: stored.to_vec(),
                tag,
                decompressed: Some((decompressed_len, params)),
            },
        );
        self
    }

    #[cfg(feature = "deflate")]
    pub(crate) fn file_deflate(&mut self, path: &str, data: &[u8]) -> &mut Self {
        let stored = deflate(data);
        self.file_stored(
            path,
            &stored,
            format::COMPRESSION_DEFLATE,
            data.len() as u32,
            0,
        )
    }

    #[cfg(feature = "heatshrink")]
    pub(crate) fn file_heatshrink(
        &mut self,
        path: &str,
        data: &[u8],
        window_bits: u8,
        lookahead_bits: u8,
    ) -> &mut Self {
        let stored = heatshrink_literals(data);
        self.file_stored(
            path,
            &stored,
            format::COMPRESSION_HEATSHRINK,
            data.len() as u32,
            u16::from(window_bits) | (u16::from(lookahead_bits) << 8),
        )
    }

    /// Appends an 8-byte trailing checksum area counted by `binary_len`.
    /// The reader must ignore it.
    pub(crate) fn trailer(&mut self) -> &mut Self {
        self.trailer = true;
        self
    }

    fn insert(&mut self, path: &str, kind: NodeKind) {
        let path = path.trim_start_matches('/');
        let mut segments: Vec<&str> = path.split('/').collect();
        let last = segments.pop().expect("empty path");
        assert!(!last.is_empty(), "path has an empty final segment");

        let mut parent = 0usize;
        for segment in segments {
            parent = self
                .lookup_child(parent, segment)
                .expect("missing parent directory");
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
            name: BString::from(last),
            parent,
            kind,
        });
        let NodeKind::Dir { children } = &mut self.nodes[parent].kind else {
            panic!("parent is not a directory");
        };
        children.push(index);
    }

    fn lookup_child(&self, parent: usize, name: &str) -> Option<usize> {
        let NodeKind::Dir { children } = &self.nodes[parent].kind else {
            return None;
        };
        children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].name == name)
    }

    fn full_path(&self, mut index: usize) -> BString {
        let mut segments = Vec::new();
        while index != 0 {
            segments.push(self.nodes[index].name.clone());
            index = self.nodes[index].parent;
        }

        let mut path = BString::default();
        for segment in segments.iter().rev() {
            if !path.is_empty() {
                path.push(b'/');
            }
            path.extend_from_slice(segment);
        }
        path
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let count = self.nodes.len();

        // lay out entry records, then payloads, then the optional trailer
        let mut offsets = vec![0usize; count];
        let mut cursor = format::HEADER_SIZE + format::HASH_ENTRY_SIZE * count;
        for (index, node) in self.nodes.iter().enumerate() {
            offsets[index] = cursor;
            cursor += record_size(node);
        }

        let mut data_offsets = vec![0usize; count];
        for (index, node) in self.nodes.iter().enumerate() {
            if let NodeKind::File { stored, .. } = &node.kind {
                cursor = format::align_up(cursor);
                data_offsets[index] = cursor;
                cursor += stored.len();
            }
        }

        let trailer_at = self.trailer.then(|| {
            cursor = format::align_up(cursor);
            let at = cursor;
            cursor += 8;
            at
        });
        let total = cursor;

        let mut table: Vec<(u32, usize)> = (0..count)
            .map(|index| (hashing::hash_path(self.full_path(index)), offsets[index]))
            .collect();
        table.sort_by_key(|&(hash, _)| hash);

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&format::MAGIC.to_le_bytes());
        out.push(format::VERSION_MAJOR);
        out.push(format::VERSION_MINOR);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&u32::try_from(count).unwrap().to_le_bytes());
        out.extend_from_slice(&u32::try_from(total).unwrap().to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());

        for &(hash, offset) in &table {
            out.extend_from_slice(&hash.to_le_bytes());
            out.extend_from_slice(&u32::try_from(offset).unwrap().to_le_bytes());
        }

        for (index, node) in self.nodes.iter().enumerate() {
            assert_eq!(out.len(), offsets[index]);
            let parent_offset = if index == 0 {
                0u32
            } else {
                u32::try_from(offsets[node.parent]).unwrap()
            };

            match &node.kind {
                NodeKind::Dir { children } => {
                    out.push(format::TYPE_DIR);
                    out.push(format::COMPRESSION_NONE);
                    out.extend_from_slice(&u16::try_from(node.name.len()).unwrap().to_le_bytes());
                    out.extend_from_slice(&parent_offset.to_le_bytes());
                    out.extend_from_slice(&u32::try_from(children.len()).unwrap().to_le_bytes());
                    for &child in children {
                        out.extend_from_slice(
                            &u32::try_from(offsets[child]).unwrap().to_le_bytes(),
                        );
                    }
                }
                NodeKind::File {
                    stored,
                    tag,
                    decompressed,
                } => {
                    out.push(format::TYPE_FILE);
                    out.push(*tag);
                    out.extend_from_slice(&u16::try_from(node.name.len()).unwrap().to_le_bytes());
                    out.extend_from_slice(&parent_offset.to_le_bytes());
                    out.extend_from_slice(&u32::try_from(stored.len()).unwrap().to_le_bytes());
                    out.extend_from_slice(
                        &u32::try_from(data_offsets[index]).unwrap().to_le_bytes(),
                    );
                    if let Some((decompressed_len, params)) = decompressed {
                        out.extend_from_slice(&decompressed_len.to_le_bytes());
                        out.extend_from_slice(&params.to_le_bytes());
                    }
                }
            }

            out.extend_from_slice(&node.name);
            out.push(0);
            while out.len() % format::ALIGNMENT != 0 {
                out.push(0);
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if let NodeKind::File { stored, .. } = &node.kind {
                while out.len() < data_offsets[index] {
                    out.push(0);
                }
                out.extend_from_slice(stored);
            }
        }

        if let Some(at) = trailer_at {
            while out.len() < at {
                out.push(0);
            }
            out.extend_from_slice(&0xEEEE_EEEE_EEEE_EEEEu64.to_le_bytes());
        }

        assert_eq!(out.len(), total);
        out
    }
}

fn record_size(node: &Node) -> usize {
    let body = match &node.kind {
        NodeKind::Dir { children } => 0x4 + 0x4 * children.len(),
        NodeKind::File { decompressed, .. } => 0x8 + if decompressed.is_some() { 0x6 } else { 0 },
    };
    format::align_up(0x8 + body + node.name.len() + 1)
}

#[cfg(feature = "deflate")]
pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
    use std::io::Write as _;

    let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("in-memory deflate write");
    encoder.finish().expect("in-memory deflate finish")
}

/// MSB-first bit packer matching the heatshrink stream layout.
#[cfg(feature = "heatshrink")]
#[derive(Default)]
pub(crate) struct BitWriter {
    out: Vec<u8>,
    current: u8,
    used: u8,
}

#[cfg(feature = "heatshrink")]
impl BitWriter {
    pub(crate) fn push(&mut self, value: u16, bits: u8) {
        for shift in (0..bits).rev() {
            let bit = (value >> shift) & 1;
            self.current = (self.current << 1) | bit as u8;
            self.used += 1;
            if self.used == 8 {
                self.out.push(self.current);
                self.current = 0;
                self.used = 0;
            }
        }
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.current <<= 8 - self.used;
            self.out.push(self.current);
        }
        self.out
    }
}

/// Encodes `data` as a heatshrink stream of literals only. Decodable with
/// any window/lookahead parameters.
#[cfg(feature = "heatshrink")]
pub(crate) fn heatshrink_literals(data: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::default();
    for &byte in data {
        writer.push(1, 1);
        writer.push(u16::from(byte), 8);
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::ImageBuilder;
    use crate::format;

    #[test]
    fn header_layout() {
        let bytes = ImageBuilder::new().build();
        assert_eq!(&bytes[..4], &format::MAGIC.to_le_bytes());
        assert_eq!(bytes[4], format::VERSION_MAJOR);
        // one entry: the root
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &(bytes.len() as u32).to_le_bytes());
        // records start 4-byte aligned right after the hash index
        assert_eq!((format::HEADER_SIZE + format::HASH_ENTRY_SIZE) % 4, 0);
    }

    #[cfg(feature = "heatshrink")]
    #[test]
    fn bit_writer_packs_msb_first() {
        let mut writer = super::BitWriter::default();
        writer.push(1, 1);
        writer.push(0b0110_0001, 8);
        let bytes = writer.finish();
        assert_eq!(bytes, [0b1011_0000, 0b1000_0000]);
    }
}
