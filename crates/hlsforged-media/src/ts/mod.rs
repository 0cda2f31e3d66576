//! MPEG-2 Transport Stream output.
//!
//! - `packet` - 188-byte packets, continuity counters, adaptation fields
//! - `psi` - PAT/PMT sections
//! - `pes` - PES framing and 33-bit timestamps
//! - `es` - Annex B / ADTS conversion of sample payloads
//! - `muxer` - interleaving a segment plan into packets

pub mod crc;
pub mod es;
pub mod muxer;
pub mod packet;
pub mod pes;
pub mod psi;

pub use crc::crc32_mpeg;
pub use es::EsFormat;
pub use muxer::{mux, MuxStats, TsMuxer, PRESENTATION_DELAY};
pub use packet::{PacketHeader, PacketWriter, TS_PACKET_SIZE};
