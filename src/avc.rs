//! H.264 bitstream helpers.
//!
//! Encoders hand out Annex B access units (start-code delimited NAL units).
//! Containers such as FLV want AVCC instead: 4-byte length prefixes, with the
//! SPS/PPS moved into an `AVCDecoderConfigurationRecord`.

/// H.264 NAL unit type constants.
pub mod nal_unit_type {
    /// Non-IDR slice (P/B frame)
    pub const NON_IDR_SLICE: u8 = 1;
    /// IDR slice (keyframe)
    pub const IDR_SLICE: u8 = 5;
    /// Supplemental enhancement information
    pub const SEI: u8 = 6;
    /// Sequence parameter set
    pub const SPS: u8 = 7;
    /// Picture parameter set
    pub const PPS: u8 = 8;
    /// Access unit delimiter
    pub const AUD: u8 = 9;
}

/// One NAL unit borrowed from an Annex B buffer (no start code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    pub data: &'a [u8],
    pub nal_type: u8,
}

impl NalUnit<'_> {
    pub fn is_idr(&self) -> bool {
        self.nal_type == nal_unit_type::IDR_SLICE
    }

    pub fn is_sps(&self) -> bool {
        self.nal_type == nal_unit_type::SPS
    }

    pub fn is_pps(&self) -> bool {
        self.nal_type == nal_unit_type::PPS
    }

    /// Parameter sets and delimiters, which AVCC carries out of band.
    pub fn is_out_of_band(&self) -> bool {
        matches!(
            self.nal_type,
            nal_unit_type::SPS | nal_unit_type::PPS | nal_unit_type::AUD
        )
    }
}

/// Split an Annex B buffer on 3- and 4-byte start codes.
pub fn nal_units(data: &[u8]) -> Vec<NalUnit<'_>> {
    // (payload start, start code start)
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let code_start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            starts.push((i + 3, code_start));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nals = Vec::with_capacity(starts.len());
    for (idx, &(start, _)) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).map_or(data.len(), |&(_, code)| code);
        if start >= end {
            continue;
        }
        let payload = &data[start..end];
        nals.push(NalUnit {
            data: payload,
            nal_type: payload[0] & 0x1f,
        });
    }
    nals
}

/// A parsed Annex B access unit.
#[derive(Debug)]
pub struct ParsedAccessUnit<'a> {
    /// NAL units other than SPS/PPS/AUD.
    pub nals: Vec<NalUnit<'a>>,
    pub sps: Option<&'a [u8]>,
    pub pps: Option<&'a [u8]>,
    pub is_keyframe: bool,
}

pub fn parse_annex_b(data: &[u8]) -> ParsedAccessUnit<'_> {
    let mut parsed = ParsedAccessUnit {
        nals: Vec::new(),
        sps: None,
        pps: None,
        is_keyframe: false,
    };
    for nal in nal_units(data) {
        if nal.is_sps() {
            parsed.sps = Some(nal.data);
        } else if nal.is_pps() {
            parsed.pps = Some(nal.data);
        } else if !nal.is_out_of_band() {
            parsed.is_keyframe |= nal.is_idr();
            parsed.nals.push(nal);
        }
    }
    parsed
}

/// Length-prefix the in-band NAL units of an access unit.
pub fn annexb_to_avcc(nals: &[NalUnit<'_>]) -> Vec<u8> {
    let total: usize = nals.iter().map(|n| 4 + n.data.len()).sum();
    let mut buf = Vec::with_capacity(total);
    for nal in nals {
        buf.extend_from_slice(&(nal.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(nal.data);
    }
    buf
}

/// Build an `AVCDecoderConfigurationRecord` for one SPS and one PPS.
pub fn avc_decoder_config(sps: &[u8], pps: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(11 + sps.len() + pps.len());
    record.push(1); // configuration_version
    if sps.len() >= 4 {
        record.extend_from_slice(&sps[1..4]); // profile, compatibility, level
    } else {
        record.extend_from_slice(&[0x42, 0x00, 0x1f]); // Baseline, level 3.1
    }
    record.push(0xFF); // 4-byte NAL lengths
    record.push(0xE1); // one SPS
    record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    record.extend_from_slice(sps);
    record.push(1); // one PPS
    record.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    record.extend_from_slice(pps);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access_unit() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1, 0x09, 0xf0]);
        data.extend_from_slice(&[0, 0, 0, 1, 0x67, 0x42, 0xc0, 0x1e, 0xab]);
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xce, 0x3c, 0x80]);
        data.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00]);
        data
    }

    #[test]
    fn test_nal_units_split_on_both_start_codes() {
        let data = access_unit();
        let types: Vec<u8> = nal_units(&data).iter().map(|n| n.nal_type).collect();
        assert_eq!(types, [9, 7, 8, 5]);
    }

    #[test]
    fn test_parse_keyframe_and_parameter_sets() {
        let data = access_unit();
        let parsed = parse_annex_b(&data);
        assert!(parsed.is_keyframe);
        assert_eq!(parsed.sps, Some(&[0x67, 0x42, 0xc0, 0x1e, 0xab][..]));
        assert_eq!(parsed.pps, Some(&[0x68, 0xce, 0x3c, 0x80][..]));
        assert_eq!(parsed.nals.len(), 1);
    }

    #[test]
    fn test_annexb_to_avcc_drops_parameter_sets() {
        let data = access_unit();
        let parsed = parse_annex_b(&data);
        let avcc = annexb_to_avcc(&parsed.nals);
        // Trailing zero of the slice belongs to the slice payload.
        assert_eq!(avcc, [0, 0, 0, 4, 0x65, 0x88, 0x84, 0x00]);
    }

    #[test]
    fn test_decoder_config_record() {
        let record = avc_decoder_config(&[0x67, 0x42, 0xc0, 0x1e], &[0x68, 0xce]);
        assert_eq!(&record[..5], &[1, 0x42, 0xc0, 0x1e, 0xff]);
        assert_eq!(record[5], 0xe1);
        assert_eq!(&record[6..8], &[0, 4]);
        assert_eq!(record[12], 1);
        assert_eq!(&record[13..], &[0, 2, 0x68, 0xce]);
    }
}
