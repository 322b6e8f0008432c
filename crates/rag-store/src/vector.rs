//! Vector encoding and brute-force ranking shared by the stores.

use rag_core::Fragment;

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Convert f32 vector to bytes (little-endian).
pub fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes; trailing partial values are dropped.
pub fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Order embedded fragments by similarity to `query` and keep `limit`.
///
/// Fragments without an embedding are skipped. Equal similarities keep
/// insertion order, and a NaN similarity ranks last.
pub fn rank(query: &[f32], fragments: Vec<Fragment>, limit: usize) -> Vec<Fragment> {
    let mut scored: Vec<(f32, Fragment)> = fragments
        .into_iter()
        .filter_map(|fragment| {
            let score = cosine_similarity(query, fragment.embedding.as_deref()?);
            let score = if score.is_nan() { f32::NEG_INFINITY } else { score };
            Some((score, fragment))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(limit);
    scored.into_iter().map(|(_, fragment)| fragment).collect()
}
