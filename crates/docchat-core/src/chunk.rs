//! Sentence-boundary text chunker.
//!
//! Splits document text into passages that respect a configurable
//! `max_size` (in characters). Splitting only ever happens between
//! sentences, so a passage never ends mid-sentence.
//!
//! # Algorithm
//!
//! 1. Split the text into sentences after `.`, `!` or `?` when the
//!    punctuation is followed by whitespace.
//! 2. Trim every sentence and drop the empty ones.
//! 3. Accumulate sentences into a buffer (joined by a single space) while
//!    the buffer stays within `max_size`.
//! 4. When the next sentence would overflow a non-empty buffer, flush the
//!    buffer as a chunk and start a new one.
//! 5. A sentence that alone exceeds `max_size` becomes its own chunk.
//!
//! # Example
//!
//! ```rust
//! use docchat_core::chunk::chunk_sentences;
//!
//! let chunks = chunk_sentences("Hello world. Second sentence!", 1000);
//! assert_eq!(chunks, vec!["Hello world. Second sentence!".to_string()]);
//! ```

use crate::models::Chunk;

/// Default passage size in characters.
pub const DEFAULT_MAX_CHARS: usize = 1000;

/// Split text into sentence-aligned passages of at most `max_size` chars.
///
/// Sentences inside one passage are separated by a single space, and the
/// separator counts toward the limit. Empty input yields an empty vector.
pub fn chunk_sentences(text: &str, max_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();
        let would_be = if current_buf.is_empty() {
            sentence_len
        } else {
            current_len + 1 + sentence_len
        };

        if would_be > max_size && !current_buf.is_empty() {
            chunks.push(std::mem::take(&mut current_buf));
            current_len = 0;
        }

        if !current_buf.is_empty() {
            current_buf.push(' ');
            current_len += 1;
        }
        current_buf.push_str(sentence);
        current_len += sentence_len;
    }

    if !current_buf.is_empty() {
        chunks.push(current_buf);
    }

    chunks
}

/// Chunk one document and attribute every passage to `source`.
///
/// Ordinals are contiguous: `0, 1, 2, …, N-1`.
pub fn chunk_document(text: &str, source: &str, max_size: usize) -> Vec<Chunk> {
    chunk_sentences(text, max_size)
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| Chunk {
            text,
            source: source.to_string(),
            ordinal,
        })
        .collect()
}

/// Split on terminal punctuation followed by whitespace, trimming and
/// dropping empty sentences.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let followed_by_space = chars
            .peek()
            .map(|(_, next)| next.is_whitespace())
            .unwrap_or(false);
        if followed_by_space {
            let end = i + c.len_utf8();
            sentences.push(&text[start..end]);
            start = end;
        }
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_sentences("", 100).is_empty());
        assert!(chunk_sentences("   \n\t ", 100).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_sentences("Hello, world!", 1000);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_splits_on_each_terminal_mark() {
        let sentences = split_sentences("One. Two! Three? Four");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn test_punctuation_without_whitespace_does_not_split() {
        let sentences = split_sentences("Version 1.5 ships soon. See example.com for more.");
        assert_eq!(
            sentences,
            vec!["Version 1.5 ships soon.", "See example.com for more."]
        );
    }

    #[test]
    fn test_newlines_count_as_whitespace() {
        let sentences = split_sentences("First line.\nSecond line.\n\nThird.");
        assert_eq!(sentences, vec!["First line.", "Second line.", "Third."]);
    }

    #[test]
    fn test_greedy_accumulation() {
        // "Aaaa." and "Bbbb." are 5 chars; joined they are 11 chars.
        let chunks = chunk_sentences("Aaaa. Bbbb. Cccc.", 11);
        assert_eq!(chunks, vec!["Aaaa. Bbbb.", "Cccc."]);
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = "This sentence is far longer than the configured limit.";
        let text = format!("Short. {} Tail.", long);
        let chunks = chunk_sentences(&text, 10);
        assert_eq!(chunks, vec!["Short.", long, "Tail."]);
    }

    #[test]
    fn test_chunks_within_limit_unless_single_sentence() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        for max in [10, 30, 64, 200] {
            for c in chunk_sentences(&text, max) {
                let single = split_sentences(&c).len() == 1;
                assert!(
                    c.chars().count() <= max || single,
                    "chunk of {} chars exceeds {}",
                    c.chars().count(),
                    max
                );
            }
        }
    }

    #[test]
    fn test_concatenation_preserves_sentence_order() {
        let text = "Refunds are accepted. Shipping takes a week!\nWhy? Because it does.  Done";
        let chunks = chunk_sentences(text, 25);
        assert_eq!(squash(&chunks.concat()), squash(text));
    }

    #[test]
    fn test_multibyte_lengths_counted_in_chars() {
        let text = "Ünïcødé wörds. Ëmöjï 🎉 here.";
        let chunks = chunk_sentences(text, 14);
        assert_eq!(chunks, vec!["Ünïcødé wörds.", "Ëmöjï 🎉 here."]);
    }

    #[test]
    fn test_chunk_document_ordinals_and_source() {
        let chunks = chunk_document("A one. B two. C three.", "policy.txt", 7);
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i);
            assert_eq!(c.source, "policy.txt");
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha. Beta. Gamma. Delta.";
        assert_eq!(chunk_sentences(text, 12), chunk_sentences(text, 12));
    }
}
