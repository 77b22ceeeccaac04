//! WAV container duration probe.
//!
//! The synthesis client requests WAV output precisely so playback timing can
//! be computed here without an audio decoder: duration is the `data` chunk
//! length over the `fmt ` chunk byte rate.

/// Compute a WAV clip's duration in milliseconds. Returns `None` for
/// anything that is not a well-formed RIFF/WAVE container.
#[must_use]
pub fn duration_ms(bytes: &[u8]) -> Option<u64> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut byte_rate: Option<u64> = None;
    let mut data_len: Option<u64> = None;

    let mut offset = 12usize;
    while offset + 8 <= bytes.len() {
        let chunk_id = &bytes[offset..offset + 4];
        let chunk_size = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().ok()?) as usize;
        let body = offset + 8;

        match chunk_id {
            b"fmt " => {
                if body + 12 > bytes.len() {
                    return None;
                }
                let rate = u32::from_le_bytes(bytes[body + 8..body + 12].try_into().ok()?);
                byte_rate = Some(u64::from(rate));
            }
            b"data" => {
                // Trust the header but never claim more than is present.
                let available = bytes.len().saturating_sub(body);
                data_len = Some(chunk_size.min(available) as u64);
            }
            _ => {}
        }

        if byte_rate.is_some() && data_len.is_some() {
            break;
        }

        // Chunks are word-aligned.
        offset = body.saturating_add(chunk_size).saturating_add(chunk_size % 2);
    }

    let byte_rate = byte_rate?;
    let data_len = data_len?;
    if byte_rate == 0 {
        return None;
    }
    Some(data_len * 1000 / byte_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal WAV: PCM mono, `sample_rate` Hz, 16-bit.
    fn wav(sample_rate: u32, samples: usize) -> Vec<u8> {
        let byte_rate = sample_rate * 2;
        let data_len = (samples * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes()); // block align
        out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend(std::iter::repeat_n(0u8, samples * 2));
        out
    }

    #[test]
    fn one_second_clip_is_1000ms() {
        let bytes = wav(24_000, 24_000);
        assert_eq!(duration_ms(&bytes), Some(1000));
    }

    #[test]
    fn half_second_clip_rounds_down() {
        let bytes = wav(24_000, 12_000);
        assert_eq!(duration_ms(&bytes), Some(500));
    }

    #[test]
    fn truncated_data_is_clamped() {
        let mut bytes = wav(24_000, 24_000);
        bytes.truncate(bytes.len() - 24_000); // half the samples are missing
        assert_eq!(duration_ms(&bytes), Some(500));
    }

    #[test]
    fn non_wav_bytes_probe_as_none() {
        assert_eq!(duration_ms(b"ID3\x03mp3 junk"), None);
        assert_eq!(duration_ms(&[]), None);
    }

    #[test]
    fn zero_byte_rate_is_rejected() {
        let mut bytes = wav(24_000, 100);
        // byte_rate field sits at offset 12 (RIFF) + 8 (fmt header) + 8.
        bytes[28..32].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(duration_ms(&bytes), None);
    }
}
