//! Hardware buffer conversion
//!
//! Converts hardware audio buffers into the canonical form the encoding
//! sink expects: interleaved f32 at a fixed channel count. Isolated here
//! so it stays unit-testable independent of the capture pipeline.

/// Convert signed 16-bit PCM to f32 in [-1.0, 1.0]
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32_768.0).collect()
}

/// Convert unsigned 16-bit PCM to f32 in [-1.0, 1.0]
pub fn u16_to_f32(samples: &[u16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| (s as f32 - 32_768.0) / 32_768.0)
        .collect()
}

/// Remix interleaved audio to the target channel count.
///
/// Downmixing averages all source channels per frame; upmixing from mono
/// duplicates the single channel. Wider-to-stereo keeps the front pair.
pub fn remix(interleaved: &[f32], channels: u16, target: u16) -> Vec<f32> {
    if channels == target || channels == 0 || target == 0 {
        return interleaved.to_vec();
    }

    let channels = channels as usize;
    let frames = interleaved.len() / channels;
    let mut out = Vec::with_capacity(frames * target as usize);

    for frame in interleaved.chunks_exact(channels) {
        match target {
            1 => {
                let sum: f32 = frame.iter().sum();
                out.push(sum / channels as f32);
            }
            2 if channels == 1 => {
                out.push(frame[0]);
                out.push(frame[0]);
            }
            2 => {
                out.push(frame[0]);
                out.push(frame[1]);
            }
            _ => {
                // Uncommon target: repeat the frame average
                let sum: f32 = frame.iter().sum();
                let avg = sum / channels as f32;
                out.extend(std::iter::repeat(avg).take(target as usize));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_full_scale_maps_to_unit_range() {
        let converted = i16_to_f32(&[i16::MIN, 0, i16::MAX]);
        assert!((converted[0] + 1.0).abs() < 1e-4);
        assert!(converted[1].abs() < 1e-6);
        assert!((converted[2] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn u16_midpoint_is_silence() {
        let converted = u16_to_f32(&[0, 32_768, u16::MAX]);
        assert!((converted[0] + 1.0).abs() < 1e-4);
        assert!(converted[1].abs() < 1e-6);
        assert!((converted[2] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mono = remix(&[0.2, 0.4, -1.0, 1.0], 2, 1);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let stereo = remix(&[0.5, -0.5], 1, 2);
        assert_eq!(stereo, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn matching_channels_pass_through() {
        let data = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(remix(&data, 2, 2), data.to_vec());
    }

    #[test]
    fn surround_to_stereo_keeps_front_pair() {
        let stereo = remix(&[0.1, 0.2, 0.9, 0.9, 0.3, 0.4, 0.9, 0.9], 4, 2);
        assert_eq!(stereo, vec![0.1, 0.2, 0.3, 0.4]);
    }
}
