//! MP4 box walker.
//!
//! Walks the whole file with an explicit stack of open containers, so
//! nesting depth never grows the call stack. Every box length is checked
//! against the bytes its parent has left before anything is read.

use super::atoms::{BoxHeader, BoxNode, BoxTree, BoxType};
use super::boxes::{self, BoxPayload};
use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

/// Maximum allowed typed box payload (64 MB) to prevent OOM on malformed files.
const MAX_BOX_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// Maximum container nesting depth.
pub const MAX_DEPTH: usize = 16;

/// MP4 box reader.
pub struct Mp4Reader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    /// Create a new reader, measuring the source length.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, file_size })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Give back the underlying source.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read every box in the file into a tree.
    pub fn read_tree(&mut self) -> Result<BoxTree> {
        let mut tree = BoxTree::default();
        // (container node, end offset) for every open container
        let mut open: Vec<(Option<usize>, u64)> = vec![(None, self.file_size)];
        let mut pos = 0u64;

        while let Some(&(parent, end)) = open.last() {
            if pos == end {
                open.pop();
                continue;
            }

            // Padding or a zero terminator (QuickTime `udta`) closing a container
            if parent.is_some() && end - pos < 8 {
                tracing::trace!(offset = pos, bytes = end - pos, "Skipping container tail");
                pos = end;
                continue;
            }

            let header = self.read_header(pos, end - pos)?;
            let box_type = header.box_type;

            let payload = if box_type.is_container() {
                BoxPayload::Container
            } else if box_type.has_typed_payload() {
                let data = self.read_box_data(pos, &header)?;
                boxes::decode(box_type, &data)?
            } else {
                BoxPayload::Opaque
            };

            let index = tree.push(BoxNode {
                header,
                offset: pos,
                parent,
                children: Vec::new(),
                payload,
            });

            if box_type.is_container() {
                if open.len() > MAX_DEPTH {
                    return Err(Error::malformed(format!(
                        "box nesting deeper than {} at {} (offset {})",
                        MAX_DEPTH, box_type, pos
                    )));
                }
                open.push((Some(index), pos + header.size));
                pos += header.header_size as u64;
            } else {
                pos += header.size;
            }
        }

        tracing::trace!(boxes = tree.len(), file_size = self.file_size, "Read box tree");
        Ok(tree)
    }

    /// Read and validate the header of the box at `pos`, which may use at
    /// most `available` bytes.
    fn read_header(&mut self, pos: u64, available: u64) -> Result<BoxHeader> {
        if available < 8 {
            return Err(Error::malformed(format!(
                "{} trailing bytes at offset {} are too short for a box header",
                available, pos
            )));
        }

        self.reader.seek(SeekFrom::Start(pos))?;
        let mut raw = [0u8; 8];
        self.reader.read_exact(&mut raw)?;

        let size = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64;
        let box_type = BoxType::from_bytes([raw[4], raw[5], raw[6], raw[7]]);

        let (size, header_size) = match size {
            1 => {
                if available < 16 {
                    return Err(Error::malformed(format!(
                        "{} at offset {} has no room for a 64-bit size",
                        box_type, pos
                    )));
                }
                let mut ext = [0u8; 8];
                self.reader.read_exact(&mut ext)?;
                (u64::from_be_bytes(ext), 16u8)
            }
            // Box extends to the end of its enclosing space
            0 => (available, 8u8),
            _ => (size, 8u8),
        };

        if size < header_size as u64 {
            return Err(Error::malformed(format!(
                "{} at offset {} declares size {} smaller than its header",
                box_type, pos, size
            )));
        }
        if size > available {
            return Err(Error::malformed(format!(
                "{} at offset {} declares {} bytes but only {} remain",
                box_type, pos, size, available
            )));
        }

        Ok(BoxHeader {
            box_type,
            size,
            header_size,
        })
    }

    /// Read a typed box payload, rejecting oversized boxes.
    fn read_box_data(&mut self, pos: u64, header: &BoxHeader) -> Result<Vec<u8>> {
        let size = header.data_size();
        if size > MAX_BOX_DATA_SIZE {
            return Err(Error::malformed(format!(
                "{} data size {} exceeds maximum {}",
                header.box_type, size, MAX_BOX_DATA_SIZE
            )));
        }
        self.reader
            .seek(SeekFrom::Start(pos + header.header_size as u64))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }
}
