//! Packetized Elementary Stream framing.

/// Timestamps wrap at 33 bits.
pub const TIMESTAMP_MASK: u64 = 0x1_FFFF_FFFF;

/// Encode a 33-bit PTS/DTS into 5 bytes with the given 4-bit prefix.
pub fn encode_timestamp(ts: u64, prefix: u8) -> [u8; 5] {
    let ts = ts & TIMESTAMP_MASK;
    [
        (prefix << 4) | (((ts >> 29) as u8) & 0x0E) | 0x01,
        (ts >> 22) as u8,
        (((ts >> 14) as u8) & 0xFE) | 0x01,
        (ts >> 7) as u8,
        (((ts << 1) as u8) & 0xFE) | 0x01,
    ]
}

/// Inverse of [`encode_timestamp`].
pub fn decode_timestamp(bytes: &[u8]) -> Option<u64> {
    let b = bytes.get(..5)?;
    Some(
        (((b[0] as u64) >> 1) & 0x07) << 30
            | (b[1] as u64) << 22
            | ((b[2] as u64) >> 1) << 15
            | (b[3] as u64) << 7
            | (b[4] as u64) >> 1,
    )
}

/// Build a PES packet around one access unit.
///
/// `dts` is written only when it differs from `pts`. Unbounded packets
/// (video) and payloads too large for the 16-bit length carry a length of 0.
pub fn build_pes(stream_id: u8, pts: u64, dts: Option<u64>, payload: &[u8], bounded: bool) -> Vec<u8> {
    let dts = dts.filter(|&d| d != pts);
    let header_data_len: usize = if dts.is_some() { 10 } else { 5 };
    let packet_len = 3 + header_data_len + payload.len();

    let mut pes = Vec::with_capacity(9 + header_data_len + payload.len());
    pes.extend_from_slice(&[0x00, 0x00, 0x01, stream_id]);
    let length_field = if bounded && packet_len <= u16::MAX as usize {
        packet_len as u16
    } else {
        0
    };
    pes.extend_from_slice(&length_field.to_be_bytes());
    // Marker bits, data alignment
    pes.push(0x84);
    match dts {
        Some(dts) => {
            pes.push(0xC0);
            pes.push(header_data_len as u8);
            pes.extend_from_slice(&encode_timestamp(pts, 0x3));
            pes.extend_from_slice(&encode_timestamp(dts, 0x1));
        }
        None => {
            pes.push(0x80);
            pes.push(header_data_len as u8);
            pes.extend_from_slice(&encode_timestamp(pts, 0x2));
        }
    }
    pes.extend_from_slice(payload);
    pes
}

/// Timing fields of a PES header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    pub packet_length: u16,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    /// Offset of the payload from the start of the packet.
    pub header_len: usize,
}

impl PesHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.get(..3)? != [0x00, 0x00, 0x01] {
            return None;
        }
        let flags = *data.get(7)?;
        let header_data_len = *data.get(8)? as usize;
        let pts = if flags & 0x80 != 0 {
            decode_timestamp(data.get(9..)?)
        } else {
            None
        };
        let dts = if flags & 0x40 != 0 {
            decode_timestamp(data.get(14..)?)
        } else {
            None
        };
        Some(Self {
            stream_id: data[3],
            packet_length: u16::from_be_bytes([data[4], data[5]]),
            pts,
            dts,
            header_len: 9 + header_data_len,
        })
    }
}
