//! PCM16 codec: float samples to/from little-endian 16-bit wire bytes,
//! plus the base64 transport layer and small channel utilities.
//!
//! Encoding is asymmetric to use the full i16 range: negative samples scale
//! by 32768, positive by 32767. Decoding divides by 32768 uniformly, so a
//! round trip is within one quantization step but not bit-exact.

use crate::error::{TowerError, TowerResult};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

/// Encode float samples as little-endian PCM16 bytes.
///
/// Samples are clamped to [-1.0, 1.0] first; non-finite samples are a
/// format error rather than silently becoming full-scale clicks.
pub fn encode_pcm16(samples: &[f32]) -> TowerResult<Vec<u8>> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        if !s.is_finite() {
            return Err(TowerError::Format(format!(
                "non-finite sample in capture block: {}",
                s
            )));
        }
        let clamped = s.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 32768.0).round() as i16
        } else {
            (clamped * 32767.0).round() as i16
        };
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

/// Decode little-endian PCM16 bytes into float samples in [-1.0, 1.0].
///
/// `channels` is only used for alignment validation; the samples come back
/// interleaved exactly as they arrived.
pub fn decode_pcm16(bytes: &[u8], channels: u16) -> TowerResult<Vec<f32>> {
    if channels == 0 {
        return Err(TowerError::Format("channel count must be non-zero".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(TowerError::Format(format!(
            "odd PCM16 payload length: {} bytes",
            bytes.len()
        )));
    }
    let sample_count = bytes.len() / 2;
    if sample_count % channels as usize != 0 {
        return Err(TowerError::Format(format!(
            "{} samples do not align to {} channels",
            sample_count, channels
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();
    Ok(samples)
}

/// Base64-encode raw PCM bytes for the wire.
pub fn transport_encode(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode a base64 wire payload back to raw PCM bytes.
pub fn transport_decode(data: &str) -> TowerResult<Vec<u8>> {
    B64.decode(data)
        .map_err(|e| TowerError::Format(format!("invalid base64 audio payload: {}", e)))
}

/// Interleave per-channel sample buffers frame-major. All channels must have
/// the same length.
pub fn interleave(channels: &[Vec<f32>]) -> TowerResult<Vec<f32>> {
    let Some(first) = channels.first() else {
        return Ok(Vec::new());
    };
    let frames = first.len();
    if channels.iter().any(|c| c.len() != frames) {
        return Err(TowerError::Format(
            "channel buffers have mismatched lengths".into(),
        ));
    }
    let mut out = Vec::with_capacity(frames * channels.len());
    for frame in 0..frames {
        for channel in channels {
            out.push(channel[frame]);
        }
    }
    Ok(out)
}

/// Split interleaved samples into per-channel buffers.
pub fn deinterleave(samples: &[f32], channels: u16) -> TowerResult<Vec<Vec<f32>>> {
    if channels == 0 {
        return Err(TowerError::Format("channel count must be non-zero".into()));
    }
    let n = channels as usize;
    if samples.len() % n != 0 {
        return Err(TowerError::Format(format!(
            "{} samples do not align to {} channels",
            samples.len(),
            channels
        )));
    }
    let mut out = vec![Vec::with_capacity(samples.len() / n); n];
    for (i, &s) in samples.iter().enumerate() {
        out[i % n].push(s);
    }
    Ok(out)
}

/// Root-mean-square level of a block, for UI volume metering.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_one_step() {
        let samples = [-1.0f32, -0.5, 0.0, 0.25, 0.5, 1.0];
        let bytes = encode_pcm16(&samples).unwrap();
        let decoded = decode_pcm16(&bytes, 1).unwrap();
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= 1.0 / 32768.0 + 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn out_of_range_samples_clamp() {
        let bytes = encode_pcm16(&[2.0, -3.0]).unwrap();
        let decoded = decode_pcm16(&bytes, 1).unwrap();
        assert!((decoded[0] - 32767.0 / 32768.0).abs() < 1e-6);
        assert!((decoded[1] - -1.0).abs() < 1e-6);
    }

    #[test]
    fn non_finite_sample_is_rejected() {
        assert!(encode_pcm16(&[0.1, f32::NAN]).is_err());
        assert!(encode_pcm16(&[f32::INFINITY]).is_err());
    }

    #[test]
    fn odd_length_payload_is_rejected() {
        assert!(decode_pcm16(&[0, 1, 2], 1).is_err());
    }

    #[test]
    fn channel_misalignment_is_rejected() {
        // 3 samples cannot be 2-channel frames.
        assert!(decode_pcm16(&[0, 0, 0, 0, 0, 0], 2).is_err());
        assert!(decode_pcm16(&[0, 0, 0, 0], 2).is_ok());
    }

    #[test]
    fn base64_round_trip() {
        let bytes = encode_pcm16(&[0.1, -0.2, 0.3]).unwrap();
        let wire = transport_encode(&bytes);
        assert_eq!(transport_decode(&wire).unwrap(), bytes);
        assert!(transport_decode("not@base64!").is_err());
    }

    #[test]
    fn interleave_round_trip() {
        let left = vec![1.0, 2.0, 3.0];
        let right = vec![-1.0, -2.0, -3.0];
        let mixed = interleave(&[left.clone(), right.clone()]).unwrap();
        assert_eq!(mixed, vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
        let split = deinterleave(&mixed, 2).unwrap();
        assert_eq!(split, vec![left, right]);
    }

    #[test]
    fn interleave_rejects_ragged_channels() {
        assert!(interleave(&[vec![1.0, 2.0], vec![1.0]]).is_err());
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0, 0.0, 0.0]), 0.0);
        assert!((rms(&[0.5, -0.5]) - 0.5).abs() < 1e-6);
    }
}
