//! BM25 keyword scorer
//!
//! Scores the sparse branch of hybrid retrieval over the candidate set
//! returned by the dense branch (or by a filtered scroll in pure keyword
//! mode). Raw BM25 values are min-max normalized to [0, 1] before fusion so
//! hybrid scores stay monotone in both components.

/// BM25 tuning parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BM25Params {
    /// Term-frequency saturation
    pub k1: f32,
    /// Length normalization strength
    pub b: f32,
}

impl Default for BM25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Stateless BM25 scorer over a candidate corpus
#[derive(Debug, Clone, Copy, Default)]
pub struct BM25Scorer {
    params: BM25Params,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl BM25Scorer {
    /// Create a scorer with the given parameters
    pub fn new(params: BM25Params) -> Self {
        Self { params }
    }

    /// Score `query` against every document, returning normalized scores in
    /// document order. An empty corpus or a query with no indexable tokens
    /// yields all zeros.
    pub fn score(&self, query: &str, documents: &[&str]) -> Vec<f32> {
        let query_terms = tokenize(query);
        if documents.is_empty() || query_terms.is_empty() {
            return vec![0.0; documents.len()];
        }

        let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        let total_docs = docs.len() as f32;
        let avg_len =
            (docs.iter().map(Vec::len).sum::<usize>() as f32 / total_docs).max(1.0);

        // Document frequency per query term.
        let mut df = vec![0usize; query_terms.len()];
        for doc in &docs {
            for (i, term) in query_terms.iter().enumerate() {
                if doc.iter().any(|t| t == term) {
                    df[i] += 1;
                }
            }
        }

        let mut raw: Vec<f32> = docs
            .iter()
            .map(|doc| {
                let doc_len = doc.len() as f32;
                query_terms
                    .iter()
                    .enumerate()
                    .map(|(i, term)| {
                        if df[i] == 0 {
                            return 0.0;
                        }
                        let tf = doc.iter().filter(|t| *t == term).count() as f32;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let idf = (1.0
                            + (total_docs - df[i] as f32 + 0.5) / (df[i] as f32 + 0.5))
                            .ln();
                        let denom = tf
                            + self.params.k1
                                * (1.0 - self.params.b + self.params.b * doc_len / avg_len);
                        idf * tf * (self.params.k1 + 1.0) / denom
                    })
                    .sum()
            })
            .collect();

        // Min-max normalize into [0, 1].
        let max = raw.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for score in &mut raw {
                *score /= max;
            }
        }
        raw
    }
}
