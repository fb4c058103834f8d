//! Delta+bitmap decompression for per-axis sensor stream packets.
//!
//! Port of the device's companion decoder: a leading bitmap (one bit
//! per residual) is itself packed into as many bytes as needed, and the
//! bitmap's own length is determined by how many residual bytes remain
//! once you've accounted for however many 1-bits (1 byte) and 0-bits (2
//! bytes) have been declared so far. See `sn2daemon/sensor_stream.py`
//! in the original source for the reference algorithm this mirrors bit
//! for bit.

use crate::error::CodecError;

/// Decompress a stream packet: `reference` seeds the running value,
/// `payload` is the bitmap followed by packed residuals.
///
/// Returns `reference` followed by each decoded residual, added onto
/// `reference` (not accumulated onto each other — every output value is
/// `reference + residual`).
pub fn decode(reference: i16, payload: &[u8]) -> Result<Vec<i16>, CodecError> {
    let mut bitmap: Vec<bool> = Vec::new();
    let mut remaining = payload.len() as i64;
    let mut cursor = 0usize;

    'bitmap: while remaining > 0 {
        remaining -= 1;
        let byte = payload[cursor];
        cursor += 1;

        for i in (0..8).rev() {
            let bit = (byte >> i) & 1 == 1;
            bitmap.push(bit);
            remaining -= if bit { 1 } else { 2 };

            if remaining <= 0 {
                if remaining < 0 {
                    return Err(CodecError::BitmapOverrun {
                        offset: cursor,
                        overrun: (-remaining) as usize,
                    });
                }
                break 'bitmap;
            }
        }
    }

    let mut values = Vec::with_capacity(1 + bitmap.len());
    values.push(reference);

    for bit in bitmap {
        let residual: i32 = if bit {
            let byte = *payload
                .get(cursor)
                .ok_or(CodecError::ResidualOverrun { offset: cursor, len: payload.len() })?;
            cursor += 1;
            byte as i8 as i32
        } else {
            let end = cursor + 2;
            if end > payload.len() {
                return Err(CodecError::ResidualOverrun { offset: cursor, len: payload.len() });
            }
            let raw = i16::from_le_bytes([payload[cursor], payload[cursor + 1]]);
            cursor = end;
            raw as i32
        };

        values.push((reference as i32 + residual) as i16);
    }

    if cursor != payload.len() {
        return Err(CodecError::TrailingPayload {
            decoded: values.len(),
            remaining: payload.len() - cursor,
        });
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// bitmap byte 0b1000_0000 then 0b0000_0000: bits are [1,0,0,0,0,0,0,0,0,...]
    /// First bit=1 -> residual budget -1, bits 2..8 (all 0) -> -2 each.
    /// remaining after first byte's 8 bits: start at len-1(for bitmap byte itself),
    /// constructed explicitly below instead of hand-computed.
    #[test]
    fn single_one_bit_residual() {
        // bitmap byte: 1 followed by all zero bits would need a lot of
        // payload; use the smallest valid case instead: one residual,
        // signalled bit=1 (1-byte residual), nothing else.
        // bitmap byte 0b1000_0000 -> bit[0]=1 (need 1 more byte),
        // remaining after processing bit[0] hits exactly 0 -> break.
        let payload = [0b1000_0000u8, 5u8];
        let out = decode(10, &payload).unwrap();
        assert_eq!(out, vec![10, 15]);
    }

    #[test]
    fn single_zero_bit_residual_two_bytes() {
        // bitmap byte 0b0000_0000: bit[0]=0 needs 2 bytes, remaining hits 0.
        let payload = [0b0000_0000u8, 0x34, 0x12];
        let out = decode(100, &payload).unwrap();
        assert_eq!(out, vec![100, 100 + 0x1234]);
    }

    #[test]
    fn output_length_matches_bit_count() {
        let payload = [0b1010_0000u8, 1, 2, 0x00, 0x00];
        // bits in order: 1,0,1,0,... loop stops once remaining<=0.
        // bit0=1 (-1) remaining = len-1-1 = 5-1-1=3
        // bit1=0 (-2) remaining = 1
        // bit2=1 (-1) remaining = 0 -> stop
        let out = decode(0, &payload).unwrap();
        assert_eq!(out.len(), 1 + 3);
        assert_eq!(out[0], 0);
    }

    #[test]
    fn rejects_negative_remaining() {
        // single byte payload: the outer loop charges 1 for the bitmap
        // byte itself (remaining 1 -> 0), then bit[0]=1 charges another
        // 1 (remaining 0 -> -1) before any residual byte is ever read,
        // so this is caught in the bitmap scan, not residual decode.
        let payload = [0b1000_0000u8];
        let err = decode(0, &payload).unwrap_err();
        assert!(matches!(err, CodecError::BitmapOverrun { .. }));
    }

    #[test]
    fn trailing_payload_is_rejected() {
        let payload = [0b1000_0000u8, 5u8, 0xFFu8];
        let err = decode(0, &payload).unwrap_err();
        assert!(matches!(err, CodecError::TrailingPayload { .. }));
    }

    #[test]
    fn every_payload_byte_consumed_on_success() {
        let payload = [0b1000_0000u8, 5u8];
        decode(0, &payload).unwrap();
        // consumption already verified by trailing-byte check inside
        // decode(); this test documents property 3 from the spec.
    }
}
