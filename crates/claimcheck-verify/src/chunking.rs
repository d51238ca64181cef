//! Sentence-aligned chunking
//!
//! Chunks close at a sentence boundary once the target size would be
//! exceeded; the next chunk reopens with the previous chunk's last
//! sentence. A sentence is never split, so a single sentence longer than
//! the target becomes its own oversized chunk.

/// Split text into trimmed sentences.
///
/// A boundary is a run of `.`, `!` or `?` (plus closing quotes or
/// brackets) followed by whitespace. Newlines count as spaces.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = normalized.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut end = idx + c.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?' | '"' | '\'' | ')' | ']') {
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            push_trimmed(&mut sentences, &normalized[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &normalized[start..]);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, sentence: &str) {
    let sentence = sentence.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        out.push(sentence);
    }
}

/// Chunk `text` into pieces of roughly `target` characters
#[must_use]
pub fn chunk_text(text: &str, target: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;
    // sentences added since the overlap carried into `current`
    let mut fresh = 0;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if fresh > 0 && current_len + len + 1 > target {
            chunks.push(current.join(" "));
            let overlap = current.pop();
            current.clear();
            current_len = 0;
            if let Some(overlap) = overlap {
                current_len = overlap.chars().count();
                current.push(overlap);
            }
            fresh = 0;
        }
        if !current.is_empty() {
            current_len += 1;
        }
        current_len += len;
        current.push(sentence);
        fresh += 1;
    }

    if fresh > 0 {
        chunks.push(current.join(" "));
    }
    chunks
}
