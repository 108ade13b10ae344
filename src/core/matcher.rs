/// Similarity above which two faces are taken to be the same person.
pub const MATCH_THRESHOLD: f32 = 0.9;

/// Cosine similarity over the common prefix of `a` and `b`; 0 when either
/// norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

pub fn is_match(similarity: f32, threshold: f32) -> bool {
    similarity > threshold
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchDecision {
    pub similarity: f32,
    pub threshold: f32,
    pub matched: bool,
}

impl MatchDecision {
    pub fn compare(a: &[f32], b: &[f32], threshold: f32) -> Self {
        if a.len() != b.len() {
            tracing::warn!("Comparing embeddings of different lengths: {} vs {}", a.len(), b.len());
        }
        let similarity = cosine_similarity(a, b);
        Self {
            similarity,
            threshold,
            matched: is_match(similarity, threshold),
        }
    }
}
