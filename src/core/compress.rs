//! C6 — optional transparent compression of file payloads above a
//! threshold, wrapped in a fixed on-disk envelope.

use crate::core::error::{CoreError, CoreResult};

pub const MAGIC: &[u8; 4] = b"RZCP";
const HEADER_LEN: usize = 4 + 4 + 4;

/// `None` if `data` is shorter than `threshold` or compression does not
/// shrink it below its original length. Otherwise the envelope ⟨magic,
/// original size, compressed size⟩ followed by the compressed payload.
pub fn compress(data: &[u8], threshold: usize) -> Option<Vec<u8>> {
    if data.len() < threshold {
        return None;
    }
    let compressed = zstd::bulk::compress(data, 0).ok()?;
    if compressed.len() + HEADER_LEN >= data.len() {
        return None;
    }
    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    out.extend_from_slice(&compressed);
    Some(out)
}

pub fn is_compressed(buf: &[u8]) -> bool {
    buf.len() >= HEADER_LEN && &buf[0..4] == MAGIC
}

pub fn decompress(buf: &[u8]) -> CoreResult<Vec<u8>> {
    if !is_compressed(buf) {
        return Err(CoreError::Corrupted("bad compression envelope magic".into()));
    }
    let original_size = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
    let compressed_size = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
    let payload = buf
        .get(HEADER_LEN..HEADER_LEN + compressed_size)
        .ok_or_else(|| CoreError::Corrupted("envelope length inconsistent with buffer".into()))?;
    let out = zstd::bulk::decompress(payload, original_size)
        .map_err(|e| CoreError::Corrupted(format!("zstd decode failed: {e}")))?;
    if out.len() != original_size {
        return Err(CoreError::Corrupted("decompressed size mismatch".into()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payload_stays_uncompressed() {
        assert!(compress(b"hi", 512).is_none());
    }

    #[test]
    fn repetitive_payload_round_trips_and_shrinks() {
        let data = vec![b'a'; 4096];
        let envelope = compress(&data, 512).expect("should compress");
        assert!(envelope.len() < data.len());
        assert!(is_compressed(&envelope));
        assert_eq!(decompress(&envelope).unwrap(), data);
    }

    #[test]
    fn random_looking_small_payload_is_not_compressed() {
        let data: Vec<u8> = (0..8u8).map(|i| i.wrapping_mul(73).wrapping_add(5)).collect();
        assert!(compress(&data, 16).is_none() || !is_compressed(&compress(&data, 0).unwrap_or_default()));
    }

    #[test]
    fn decompress_rejects_bad_magic() {
        assert!(decompress(b"NOPE").is_err());
    }
}
