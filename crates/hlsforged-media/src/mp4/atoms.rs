//! MP4 box type codes and the box tree arena.

use super::boxes::BoxPayload;

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const DINF: Self = Self(*b"dinf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");
    pub const UDTA: Self = Self(*b"udta");
    pub const MVEX: Self = Self(*b"mvex");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Check if boxes of this type contain child boxes.
    pub fn is_container(&self) -> bool {
        matches!(
            *self,
            Self::MOOV
                | Self::TRAK
                | Self::EDTS
                | Self::MDIA
                | Self::MINF
                | Self::DINF
                | Self::STBL
                | Self::UDTA
                | Self::MVEX
        )
    }

    /// Check if the payload of this box type is decoded at parse time.
    pub fn has_typed_payload(&self) -> bool {
        matches!(
            *self,
            Self::MVHD
                | Self::TKHD
                | Self::MDHD
                | Self::HDLR
                | Self::STSD
                | Self::STTS
                | Self::STSS
                | Self::STSC
                | Self::STSZ
                | Self::STCO
                | Self::CO64
                | Self::CTTS
        )
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed box header.
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    /// Box type code.
    pub box_type: BoxType,
    /// Box size including header.
    pub size: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl BoxHeader {
    /// Get the payload size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }
}

/// One decoded box in the arena.
#[derive(Debug, Clone)]
pub struct BoxNode {
    pub header: BoxHeader,
    /// File offset of the first header byte.
    pub offset: u64,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub payload: BoxPayload,
}

impl BoxNode {
    pub fn box_type(&self) -> BoxType {
        self.header.box_type
    }

    /// File offset where the payload starts.
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header.header_size as u64
    }

    /// File offset one past the last byte of the box.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.header.size
    }
}

/// Every box of a file, indexed in file order.
#[derive(Debug, Clone, Default)]
pub struct BoxTree {
    nodes: Vec<BoxNode>,
    roots: Vec<usize>,
}

impl BoxTree {
    /// Append a node, linking it under its parent.
    pub(crate) fn push(&mut self, node: BoxNode) -> usize {
        let index = self.nodes.len();
        match node.parent {
            Some(parent) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }
        self.nodes.push(node);
        index
    }

    pub fn get(&self, index: usize) -> Option<&BoxNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level box indices in file order.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Iterate over all nodes in file order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxNode> {
        self.nodes.iter()
    }

    /// Child indices of `index`.
    pub fn children(&self, index: usize) -> &[usize] {
        self.nodes
            .get(index)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// First top-level box of the given type.
    pub fn find_root(&self, box_type: BoxType) -> Option<usize> {
        self.roots
            .iter()
            .copied()
            .find(|&i| self.nodes[i].box_type() == box_type)
    }

    /// First direct child of `index` with the given type.
    pub fn find_child(&self, index: usize, box_type: BoxType) -> Option<usize> {
        self.children(index)
            .iter()
            .copied()
            .find(|&i| self.nodes[i].box_type() == box_type)
    }

    /// All direct children of `index` with the given type.
    pub fn children_of_type(
        &self,
        index: usize,
        box_type: BoxType,
    ) -> impl Iterator<Item = usize> + '_ {
        self.children(index)
            .iter()
            .copied()
            .filter(move |&i| self.nodes[i].box_type() == box_type)
    }

    /// Follow a path of child types starting from `index`.
    pub fn find_path(&self, index: usize, path: &[BoxType]) -> Option<usize> {
        path.iter()
            .try_fold(index, |current, &box_type| self.find_child(current, box_type))
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            b"text" => Self::Text,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Hint => "hint",
            Self::Meta => "meta",
            Self::Text => "text",
            Self::Unknown(_) => "unknown",
        }
    }
}
