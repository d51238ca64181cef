//! Sparse TF-IDF retrieval
//!
//! Lowercased word tokens (two or more word characters), English stop
//! words removed, unigrams plus bigrams. Vocabulary is capped by document
//! frequency, idf is smoothed (`ln((1 + n) / (1 + df)) + 1`) and every
//! vector is L2-normalized, so cosine similarity is a plain dot product.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static TOKEN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"\b\w\w+\b"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down",
        "during", "each", "either", "else", "few", "for", "from", "further", "had", "has",
        "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his",
        "how", "however", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
        "more", "most", "my", "myself", "neither", "no", "nor", "not", "now", "of", "off",
        "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
        "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
        "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
        "through", "thus", "to", "too", "under", "until", "up", "upon", "us", "very", "was",
        "we", "were", "what", "when", "where", "whether", "which", "while", "who", "whom",
        "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your",
        "yours", "yourself", "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Why ranking could not be trusted; always recovered by the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalDegradation {
    #[error("no documents to index")]
    NoDocuments,

    #[error("vocabulary is empty after stop-word removal")]
    EmptyVocabulary,

    #[error("query shares no terms with any document")]
    NoOverlap,

    #[error("tokenizer unavailable: {0}")]
    Tokenizer(String),
}

type SparseVector = Vec<(usize, f64)>;

/// Fitted TF-IDF model over a fixed document set
#[derive(Debug, Clone)]
pub struct TfIdfIndex {
    vocabulary: IndexMap<String, usize>,
    idf: Vec<f64>,
    vectors: Vec<SparseVector>,
}

/// Lowercased unigrams and bigrams with stop words removed
pub fn terms(text: &str) -> Result<Vec<String>, RetrievalDegradation> {
    let token = TOKEN
        .as_ref()
        .map_err(|e| RetrievalDegradation::Tokenizer(e.to_string()))?;
    let lowered = text.to_lowercase();
    let words: Vec<&str> = token
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| !STOP_WORDS.contains(w))
        .collect();

    let mut out: Vec<String> = words.iter().map(|w| (*w).to_string()).collect();
    out.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    Ok(out)
}

impl TfIdfIndex {
    /// Fit over `documents`, keeping at most `max_features` terms
    pub fn fit<S: AsRef<str>>(
        documents: &[S],
        max_features: usize,
    ) -> Result<Self, RetrievalDegradation> {
        if documents.is_empty() {
            return Err(RetrievalDegradation::NoDocuments);
        }

        let counts: Vec<HashMap<String, usize>> = documents
            .iter()
            .map(|d| -> Result<HashMap<String, usize>, RetrievalDegradation> {
                let mut tf = HashMap::new();
                for term in terms(d.as_ref())? {
                    *tf.entry(term).or_insert(0) += 1;
                }
                Ok(tf)
            })
            .collect::<Result<_, _>>()?;

        let mut df: HashMap<&str, usize> = HashMap::new();
        for tf in &counts {
            for term in tf.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        if df.is_empty() {
            return Err(RetrievalDegradation::EmptyVocabulary);
        }

        let mut ranked: Vec<(&str, usize)> = df.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features.max(1));
        ranked.sort_by(|a, b| a.0.cmp(b.0));

        let n = documents.len() as f64;
        let mut vocabulary = IndexMap::with_capacity(ranked.len());
        let mut idf = Vec::with_capacity(ranked.len());
        for (idx, (term, freq)) in ranked.iter().enumerate() {
            vocabulary.insert((*term).to_string(), idx);
            idf.push(((1.0 + n) / (1.0 + *freq as f64)).ln() + 1.0);
        }

        let mut index = Self {
            vocabulary,
            idf,
            vectors: Vec::new(),
        };
        index.vectors = counts.iter().map(|tf| index.weigh(tf)).collect();
        Ok(index)
    }

    fn weigh(&self, tf: &HashMap<String, usize>) -> SparseVector {
        let mut vector: SparseVector = tf
            .iter()
            .filter_map(|(term, count)| {
                self.vocabulary
                    .get(term)
                    .map(|&idx| (idx, *count as f64 * self.idf[idx]))
            })
            .collect();
        vector.sort_by_key(|(idx, _)| *idx);

        let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut vector {
                *w /= norm;
            }
        }
        vector
    }

    /// Vector for arbitrary text in this index's vocabulary
    pub fn transform(&self, text: &str) -> Result<SparseVector, RetrievalDegradation> {
        let mut tf = HashMap::new();
        for term in terms(text)? {
            *tf.entry(term).or_insert(0) += 1;
        }
        Ok(self.weigh(&tf))
    }

    #[must_use]
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Cosine similarity between two fitted documents
    #[must_use]
    pub fn similarity(&self, a: usize, b: usize) -> f64 {
        match (self.vectors.get(a), self.vectors.get(b)) {
            (Some(a), Some(b)) => dot(a, b),
            _ => 0.0,
        }
    }
}

fn dot(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

/// Chunk position and similarity to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk {
    pub index: usize,
    pub score: f64,
}

/// Rank `chunks` against `query` and keep the best `k`.
///
/// The model is fitted over the query plus every chunk. Ties keep
/// document order.
pub fn retrieve_top_k<S: AsRef<str>>(
    query: &str,
    chunks: &[S],
    k: usize,
    max_features: usize,
) -> Result<Vec<ScoredChunk>, RetrievalDegradation> {
    if chunks.is_empty() {
        return Err(RetrievalDegradation::NoDocuments);
    }

    let mut corpus: Vec<&str> = Vec::with_capacity(chunks.len() + 1);
    corpus.push(query);
    corpus.extend(chunks.iter().map(AsRef::as_ref));
    let index = TfIdfIndex::fit(&corpus, max_features)?;

    let mut scored: Vec<ScoredChunk> = (0..chunks.len())
        .map(|i| ScoredChunk {
            index: i,
            score: index.similarity(0, i + 1),
        })
        .collect();

    if scored.iter().all(|s| s.score <= 0.0) {
        return Err(RetrievalDegradation::NoOverlap);
    }

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn terms_drop_stop_words_and_add_bigrams() {
        let t = terms("The inflation rate rose in 2021").unwrap();
        assert_eq!(
            t,
            vec![
                "inflation",
                "rate",
                "rose",
                "2021",
                "inflation rate",
                "rate rose",
                "rose 2021",
            ]
        );
    }

    #[test]
    fn fitted_vectors_are_normalized() {
        let index = TfIdfIndex::fit(&["solar power capacity", "wind power output"], 1000).unwrap();
        assert!((index.similarity(0, 0) - 1.0).abs() < 1e-9);
        let cross = index.similarity(0, 1);
        assert!(cross > 0.0 && cross < 1.0);
    }

    #[test]
    fn vocabulary_cap_is_respected() {
        let index = TfIdfIndex::fit(&["alpha beta gamma delta epsilon"], 3).unwrap();
        assert_eq!(index.vocabulary_len(), 3);
    }

    #[test]
    fn stop_words_only_is_degenerate() {
        assert_eq!(
            TfIdfIndex::fit(&["the and of", "a an"], 1000).unwrap_err(),
            RetrievalDegradation::EmptyVocabulary
        );
    }

    #[test]
    fn most_similar_chunk_ranks_first() {
        let chunks = [
            "The museum opened in 1901 and houses paintings.",
            "Unemployment fell to 3.5 percent in December according to the labor report.",
            "Rainfall was above average across the region.",
        ];
        let top = retrieve_top_k("unemployment fell to 3.5 percent", &chunks, 2, 1000).unwrap();
        assert_eq!(top[0].index, 1);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn disjoint_query_degrades() {
        let chunks = ["cats sleep often", "dogs bark loudly"];
        assert_eq!(
            retrieve_top_k("quantum chromodynamics", &chunks, 3, 1000).unwrap_err(),
            RetrievalDegradation::NoOverlap
        );
    }

    #[test]
    fn ranking_is_deterministic() {
        let chunks = ["tax revenue grew", "tax revenue grew", "spending fell"];
        let a = retrieve_top_k("tax revenue", &chunks, 3, 1000).unwrap();
        let b = retrieve_top_k("tax revenue", &chunks, 3, 1000).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].index, 0);
        assert_eq!(a[1].index, 1);
    }
}
