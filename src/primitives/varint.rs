//! Bitcoin-style variable length integer, shared by the transaction codec and the
//! P2P wire codec (spec §4.1 / §6).

use crate::error::PrimitiveError;

/// Number of bytes `encode_var_int` will write for `n`.
pub fn var_int_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub fn encode_var_int(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Decode a var_int from `buf` starting at `*pos`, advancing `*pos` past it.
pub fn decode_var_int(buf: &[u8], pos: &mut usize) -> Result<u64, PrimitiveError> {
    let first = *buf.get(*pos).ok_or(PrimitiveError::Truncated)?;
    *pos += 1;
    match first {
        0xfd => {
            let bytes: [u8; 2] = buf
                .get(*pos..*pos + 2)
                .ok_or(PrimitiveError::Truncated)?
                .try_into()
                .unwrap();
            *pos += 2;
            Ok(u16::from_le_bytes(bytes) as u64)
        }
        0xfe => {
            let bytes: [u8; 4] = buf
                .get(*pos..*pos + 4)
                .ok_or(PrimitiveError::Truncated)?
                .try_into()
                .unwrap();
            *pos += 4;
            Ok(u32::from_le_bytes(bytes) as u64)
        }
        0xff => {
            let bytes: [u8; 8] = buf
                .get(*pos..*pos + 8)
                .ok_or(PrimitiveError::Truncated)?
                .try_into()
                .unwrap();
            *pos += 8;
            Ok(u64::from_le_bytes(bytes))
        }
        n => Ok(n as u64),
    }
}

/// `var_str = var_int(len) || bytes` (spec §4.7).
pub fn encode_var_str(out: &mut Vec<u8>, s: &[u8]) {
    encode_var_int(out, s.len() as u64);
    out.extend_from_slice(s);
}

pub fn decode_var_str(buf: &[u8], pos: &mut usize) -> Result<Vec<u8>, PrimitiveError> {
    let len = decode_var_int(buf, pos)? as usize;
    let bytes = buf
        .get(*pos..*pos + len)
        .ok_or(PrimitiveError::Truncated)?
        .to_vec();
    *pos += len;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(n: u64) {
        let mut buf = Vec::new();
        encode_var_int(&mut buf, n);
        assert_eq!(buf.len(), var_int_len(n));
        let mut pos = 0;
        let decoded = decode_var_int(&buf, &mut pos).unwrap();
        assert_eq!(decoded, n);
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn boundaries_roundtrip() {
        for n in [0u64, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, u64::MAX] {
            roundtrip(n);
        }
    }

    #[test]
    fn discriminator_bytes_match_spec() {
        let mut buf = Vec::new();
        encode_var_int(&mut buf, 0xfd);
        assert_eq!(buf[0], 0xfd);
        buf.clear();
        encode_var_int(&mut buf, 0x10000);
        assert_eq!(buf[0], 0xfe);
        buf.clear();
        encode_var_int(&mut buf, 0x1_0000_0000);
        assert_eq!(buf[0], 0xff);
    }
}
