use base64::Engine;

/// Sample rate of the PCM16 audio the client plays back.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Converts a slice of i16 samples to normalized f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Decodes base64 little-endian PCM16 into i16 samples.
/// Invalid input yields an empty vector; a trailing odd byte is dropped.
pub fn decode_i16(base64_fragment: &str) -> Vec<i16> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(pcm16_bytes) => pcm16_bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode base64 audio fragment");
            Vec::new()
        }
    }
}
