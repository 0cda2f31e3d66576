//! Transport stream packetization.

use crate::bucket::OutputChain;
use crate::{Error, Result};
use std::collections::HashMap;

/// Size of one transport stream packet.
pub const TS_PACKET_SIZE: usize = 188;
/// Sync byte at the start of every packet.
pub const SYNC_BYTE: u8 = 0x47;
/// PID of the Program Association Table.
pub const PAT_PID: u16 = 0x0000;
/// PID of the Program Map Table.
pub const PMT_PID: u16 = 0x1000;
/// PID of the first elementary stream; later streams follow in plan order.
pub const FIRST_ES_PID: u16 = 0x0100;

/// Longest PSI section, header and CRC included.
pub const MAX_SECTION_SIZE: usize = 1024;

const HEADER_SIZE: usize = 4;
const MAX_PAYLOAD: usize = TS_PACKET_SIZE - HEADER_SIZE;

/// Per-PID 4-bit continuity counters.
#[derive(Debug, Default, Clone)]
pub struct ContinuityCounters {
    counters: HashMap<u16, u8>,
}

impl ContinuityCounters {
    /// Counter for the next packet on `pid`; starts at 0.
    pub fn next(&mut self, pid: u16) -> u8 {
        let counter = self.counters.entry(pid).or_insert(0);
        let current = *counter;
        *counter = (current + 1) & 0x0F;
        current
    }
}

/// Adaptation field contents for the first packet of a PES unit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationFlags {
    pub random_access: bool,
    /// Program clock reference base, 90 kHz.
    pub pcr: Option<u64>,
}

impl AdaptationFlags {
    /// Bytes the field needs, including its length byte.
    fn encoded_len(&self) -> usize {
        2 + if self.pcr.is_some() { 6 } else { 0 }
    }
}

/// Writes 188-byte packets into an output chain.
#[derive(Debug, Default)]
pub struct PacketWriter {
    counters: ContinuityCounters,
    packets: usize,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets written so far.
    pub fn packets(&self) -> usize {
        self.packets
    }

    /// Write a PSI section, pointer field first. Sections longer than one
    /// packet continue in packets without the payload-unit-start bit; the
    /// last packet is filled with 0xFF.
    pub fn write_section(&mut self, out: &mut OutputChain, pid: u16, section: &[u8]) -> Result<()> {
        if section.len() > MAX_SECTION_SIZE {
            return Err(Error::unsupported(format!(
                "PSI section of {} bytes exceeds {} bytes",
                section.len(),
                MAX_SECTION_SIZE
            )));
        }

        let mut rest = section;
        let mut start = true;
        loop {
            let mut packet = [0xFFu8; TS_PACKET_SIZE];
            self.write_header(&mut packet, pid, start, false);
            let mut pos = HEADER_SIZE;
            if start {
                packet[pos] = 0x00;
                pos += 1;
            }
            let len = rest.len().min(TS_PACKET_SIZE - pos);
            packet[pos..pos + len].copy_from_slice(&rest[..len]);
            rest = &rest[len..];
            self.emit(out, &packet)?;

            if rest.is_empty() {
                return Ok(());
            }
            start = false;
        }
    }

    /// Slice a PES unit into packets. The first packet carries the
    /// payload-unit-start bit and `first` as its adaptation field; the last
    /// one is padded with adaptation-field stuffing.
    pub fn write_pes(
        &mut self,
        out: &mut OutputChain,
        pid: u16,
        pes: &[u8],
        first: Option<AdaptationFlags>,
    ) -> Result<()> {
        let mut offset = 0;
        let mut start = true;

        while offset < pes.len() {
            let flags = if start { first } else { None };
            let field_len = flags.map_or(0, |f| f.encoded_len());
            let space = MAX_PAYLOAD - field_len;
            let remaining = pes.len() - offset;
            let (payload_len, field_len) = if remaining >= space {
                (space, field_len)
            } else {
                (remaining, MAX_PAYLOAD - remaining)
            };

            let mut packet = [0xFFu8; TS_PACKET_SIZE];
            self.write_header(&mut packet, pid, start, field_len > 0);
            let mut pos = HEADER_SIZE;
            if field_len > 0 {
                write_adaptation_field(&mut packet[pos..pos + field_len], flags.unwrap_or_default());
                pos += field_len;
            }
            packet[pos..pos + payload_len].copy_from_slice(&pes[offset..offset + payload_len]);
            self.emit(out, &packet)?;

            offset += payload_len;
            start = false;
        }
        Ok(())
    }

    fn write_header(&mut self, packet: &mut [u8], pid: u16, unit_start: bool, adaptation: bool) {
        let cc = self.counters.next(pid);
        packet[0] = SYNC_BYTE;
        packet[1] = ((unit_start as u8) << 6) | ((pid >> 8) as u8 & 0x1F);
        packet[2] = pid as u8;
        packet[3] = (if adaptation { 0x30 } else { 0x10 }) | cc;
    }

    fn emit(&mut self, out: &mut OutputChain, packet: &[u8; TS_PACKET_SIZE]) -> Result<()> {
        out.write(packet)?;
        self.packets += 1;
        Ok(())
    }
}

/// Fill `field` (length byte included) with flags, PCR and 0xFF stuffing.
fn write_adaptation_field(field: &mut [u8], flags: AdaptationFlags) {
    // A single byte of stuffing is a zero-length field
    field[0] = (field.len() - 1) as u8;
    if field.len() == 1 {
        return;
    }
    let mut bits = 0x00;
    if flags.random_access {
        bits |= 0x40;
    }
    if flags.pcr.is_some() {
        bits |= 0x10;
    }
    field[1] = bits;
    if let Some(pcr) = flags.pcr {
        let base = pcr & 0x1_FFFF_FFFF;
        field[2] = (base >> 25) as u8;
        field[3] = (base >> 17) as u8;
        field[4] = (base >> 9) as u8;
        field[5] = (base >> 1) as u8;
        // Low base bit, 6 reserved bits, 9-bit extension of zero
        field[6] = ((base & 1) << 7) as u8 | 0x7E;
        field[7] = 0x00;
    }
}

/// Decoded header of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub pid: u16,
    pub payload_unit_start: bool,
    pub continuity_counter: u8,
    pub has_adaptation: bool,
    pub has_payload: bool,
}

impl PacketHeader {
    /// Parse the header of a 188-byte packet.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() != TS_PACKET_SIZE || packet[0] != SYNC_BYTE {
            return None;
        }
        Some(Self {
            pid: (((packet[1] & 0x1F) as u16) << 8) | packet[2] as u16,
            payload_unit_start: packet[1] & 0x40 != 0,
            continuity_counter: packet[3] & 0x0F,
            has_adaptation: packet[3] & 0x20 != 0,
            has_payload: packet[3] & 0x10 != 0,
        })
    }
}

/// Payload bytes of a packet, after any adaptation field.
pub fn packet_payload(packet: &[u8]) -> Option<&[u8]> {
    let header = PacketHeader::parse(packet)?;
    if !header.has_payload {
        return None;
    }
    let start = if header.has_adaptation {
        HEADER_SIZE + 1 + packet[HEADER_SIZE] as usize
    } else {
        HEADER_SIZE
    };
    packet.get(start..)
}

/// PCR base and random-access flag from a packet's adaptation field.
pub fn adaptation_flags(packet: &[u8]) -> Option<AdaptationFlags> {
    let header = PacketHeader::parse(packet)?;
    if !header.has_adaptation || packet[HEADER_SIZE] == 0 {
        return None;
    }
    let flags = packet[HEADER_SIZE + 1];
    let pcr = (flags & 0x10 != 0).then(|| {
        let b = &packet[HEADER_SIZE + 2..HEADER_SIZE + 8];
        ((b[0] as u64) << 25)
            | ((b[1] as u64) << 17)
            | ((b[2] as u64) << 9)
            | ((b[3] as u64) << 1)
            | ((b[4] as u64) >> 7)
    });
    Some(AdaptationFlags {
        random_access: flags & 0x40 != 0,
        pcr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packets(chain: &OutputChain) -> Vec<Vec<u8>> {
        chain
            .to_bytes()
            .chunks(TS_PACKET_SIZE)
            .map(|p| p.to_vec())
            .collect()
    }

    #[test]
    fn test_continuity_wraps() {
        let mut counters = ContinuityCounters::default();
        let seq: Vec<u8> = (0..18).map(|_| counters.next(0x100)).collect();
        assert_eq!(seq[..3], [0, 1, 2]);
        assert_eq!(seq[15..], [15, 0, 1]);
        assert_eq!(counters.next(0x101), 0);
    }

    #[test]
    fn test_pes_split_and_stuffing() {
        let mut out = OutputChain::default();
        let mut writer = PacketWriter::new();
        let pes: Vec<u8> = (0..400u32).map(|i| i as u8).collect();
        writer.write_pes(&mut out, 0x100, &pes, None).unwrap();

        let packets = packets(&out);
        assert_eq!(packets.len(), 3);
        assert_eq!(writer.packets(), 3);

        let headers: Vec<PacketHeader> = packets.iter().map(|p| PacketHeader::parse(p).unwrap()).collect();
        assert!(headers[0].payload_unit_start);
        assert!(!headers[1].payload_unit_start);
        assert_eq!(
            headers.iter().map(|h| h.continuity_counter).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(headers[2].has_adaptation);

        let payload: Vec<u8> = packets.iter().flat_map(|p| packet_payload(p).unwrap().to_vec()).collect();
        assert_eq!(payload, pes);
    }

    #[test]
    fn test_single_byte_stuffing() {
        let mut out = OutputChain::default();
        let mut writer = PacketWriter::new();
        writer.write_pes(&mut out, 0x100, &[0xAA; 183], None).unwrap();

        let packet = out.to_bytes();
        assert_eq!(packet.len(), TS_PACKET_SIZE);
        assert_eq!(packet[3] & 0x30, 0x30);
        assert_eq!(packet[4], 0);
        assert_eq!(packet_payload(&packet).unwrap(), &[0xAA; 183][..]);
    }

    #[test]
    fn test_pcr_round_trip() {
        let mut out = OutputChain::default();
        let mut writer = PacketWriter::new();
        let flags = AdaptationFlags {
            random_access: true,
            pcr: Some(0x1_2345_6789),
        };
        writer.write_pes(&mut out, 0x100, &[1; 500], Some(flags)).unwrap();

        let bytes = out.to_bytes();
        assert_eq!(adaptation_flags(&bytes[..TS_PACKET_SIZE]), Some(flags));
        assert_eq!(adaptation_flags(&bytes[TS_PACKET_SIZE..2 * TS_PACKET_SIZE]), None);
        assert_eq!(packet_payload(&bytes[..TS_PACKET_SIZE]).unwrap().len(), 176);
    }

    #[test]
    fn test_section_packet() {
        let mut out = OutputChain::default();
        let mut writer = PacketWriter::new();
        writer.write_section(&mut out, PAT_PID, &[0x00, 0xB0, 0x0D]).unwrap();
        writer.write_section(&mut out, PAT_PID, &[0x00, 0xB0, 0x0D]).unwrap();

        let bytes = out.to_bytes();
        let second = PacketHeader::parse(&bytes[TS_PACKET_SIZE..]).unwrap();
        assert_eq!(second.pid, PAT_PID);
        assert!(second.payload_unit_start);
        assert_eq!(second.continuity_counter, 1);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0xB0, 0x0D]);
        assert!(bytes[8..TS_PACKET_SIZE].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_long_section_spans_packets() {
        let section: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut out = OutputChain::default();
        let mut writer = PacketWriter::new();
        writer.write_section(&mut out, PMT_PID, &section).unwrap();
        assert_eq!(writer.packets(), 2);

        let bytes = out.to_bytes();
        let first = PacketHeader::parse(&bytes[..TS_PACKET_SIZE]).unwrap();
        let second = PacketHeader::parse(&bytes[TS_PACKET_SIZE..]).unwrap();
        assert!(first.payload_unit_start);
        assert!(!second.payload_unit_start);
        assert_eq!((first.continuity_counter, second.continuity_counter), (0, 1));

        // Pointer field, then 183 + 117 section bytes, then stuffing
        assert_eq!(bytes[4], 0x00);
        assert_eq!(&bytes[5..TS_PACKET_SIZE], &section[..183]);
        assert_eq!(&bytes[TS_PACKET_SIZE + 4..TS_PACKET_SIZE + 121], &section[183..]);
        assert!(bytes[TS_PACKET_SIZE + 121..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_oversized_section_is_rejected() {
        let mut out = OutputChain::default();
        let mut writer = PacketWriter::new();
        let result = writer.write_section(&mut out, PMT_PID, &[0; MAX_SECTION_SIZE + 1]);
        assert!(matches!(result, Err(Error::UnsupportedCodec(_))));
        assert!(out.is_empty());
    }
}
