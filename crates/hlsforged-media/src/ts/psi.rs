//! Program Specific Information: PAT and PMT sections.

use super::crc::crc32_mpeg;

const PAT_TABLE_ID: u8 = 0x00;
const PMT_TABLE_ID: u8 = 0x02;
const TRANSPORT_STREAM_ID: u16 = 0x0001;
/// Program number of the single program carried.
pub const PROGRAM_NUMBER: u16 = 0x0001;

/// One elementary stream entry of the PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
}

/// Program Association Table mapping [`PROGRAM_NUMBER`] to `pmt_pid`.
pub fn pat_section(pmt_pid: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(4);
    body.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
    body.extend_from_slice(&(0xE000 | pmt_pid).to_be_bytes());
    section(PAT_TABLE_ID, TRANSPORT_STREAM_ID, &body)
}

/// Program Map Table listing `streams`, with the clock on `pcr_pid`.
pub fn pmt_section(pcr_pid: u16, streams: &[PmtStream]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + streams.len() * 5);
    body.extend_from_slice(&(0xE000 | pcr_pid).to_be_bytes());
    // No program descriptors
    body.extend_from_slice(&[0xF0, 0x00]);
    for stream in streams {
        body.push(stream.stream_type);
        body.extend_from_slice(&(0xE000 | stream.pid).to_be_bytes());
        body.extend_from_slice(&[0xF0, 0x00]);
    }
    section(PMT_TABLE_ID, PROGRAM_NUMBER, &body)
}

/// Long-form section: header, `body`, CRC32.
fn section(table_id: u8, id: u16, body: &[u8]) -> Vec<u8> {
    // Everything after the length field, CRC included
    let section_length = 5 + body.len() + 4;
    let mut out = Vec::with_capacity(3 + section_length);
    out.push(table_id);
    out.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
    out.push(section_length as u8);
    out.extend_from_slice(&id.to_be_bytes());
    // Version 0, current
    out.push(0xC1);
    out.push(0x00);
    out.push(0x00);
    out.extend_from_slice(body);
    let crc = crc32_mpeg(&out);
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

/// The section carried by a PSI packet payload (pointer field first).
pub fn read_section(payload: &[u8]) -> Option<&[u8]> {
    let start = 1 + *payload.first()? as usize;
    let header = payload.get(start..start + 3)?;
    let section_length = (((header[1] & 0x0F) as usize) << 8) | header[2] as usize;
    payload.get(start..start + 3 + section_length)
}

/// Elementary streams listed in a PMT section.
pub fn pmt_streams(section: &[u8]) -> Option<Vec<PmtStream>> {
    if *section.first()? != PMT_TABLE_ID || section.len() < 16 {
        return None;
    }
    let info_len = (((section[10] & 0x0F) as usize) << 8) | section[11] as usize;
    let mut pos = 12 + info_len;
    let end = section.len() - 4;
    let mut streams = Vec::new();
    while pos + 5 <= end {
        streams.push(PmtStream {
            stream_type: section[pos],
            pid: (((section[pos + 1] & 0x1F) as u16) << 8) | section[pos + 2] as u16,
        });
        let es_info_len = (((section[pos + 3] & 0x0F) as usize) << 8) | section[pos + 4] as usize;
        pos += 5 + es_info_len;
    }
    Some(streams)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pat_layout() {
        let pat = pat_section(0x1000);
        assert_eq!(
            &pat[..12],
            &[0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xF0, 0x00]
        );
        assert_eq!(pat.len(), 16);
        assert_eq!(crc32_mpeg(&pat), 0);
    }

    #[test]
    fn test_pmt_layout() {
        let streams = [
            PmtStream { stream_type: 0x1B, pid: 0x100 },
            PmtStream { stream_type: 0x0F, pid: 0x101 },
        ];
        let pmt = pmt_section(0x100, &streams);

        assert_eq!(pmt[0], 0x02);
        let section_length = (((pmt[1] & 0x0F) as usize) << 8) | pmt[2] as usize;
        assert_eq!(section_length, pmt.len() - 3);
        assert_eq!(&pmt[8..10], &[0xE1, 0x00]);
        assert_eq!(crc32_mpeg(&pmt), 0);
        assert_eq!(pmt_streams(&pmt).unwrap(), streams.to_vec());
    }

    #[test]
    fn test_read_section_skips_pointer() {
        let pat = pat_section(0x1000);
        let mut payload = vec![0x00];
        payload.extend_from_slice(&pat);
        payload.resize(184, 0xFF);
        assert_eq!(read_section(&payload), Some(&pat[..]));
        assert_eq!(read_section(&[0x00, 0x00]), None);
    }
}
