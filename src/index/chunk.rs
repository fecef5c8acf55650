//! Description chunking for embedding input.
//!
//! Long descriptions are split into fixed-size overlapping segments before
//! embedding generation. This is a recall tuning knob: each chunk is embedded
//! separately and a document scores as well as its best chunk.

/// Default chunk size in characters.
pub const CHUNK_SIZE: usize = 512;

/// Default overlap between consecutive chunks in characters.
pub const CHUNK_OVERLAP: usize = 32;

/// Split a description into overlapping chunks.
///
/// Sizes are in characters, not bytes, so multi-byte text never splits a
/// codepoint. Whitespace-only input yields no chunks. `overlap` must be less
/// than `size` (config validation enforces this); equal or larger overlap
/// would stall.
pub fn chunk_with(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![text.to_string()];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_with("", CHUNK_SIZE, CHUNK_OVERLAP).is_empty());
        assert!(chunk_with("   \n\t  ", CHUNK_SIZE, CHUNK_OVERLAP).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_with("a red car parked near the beach", CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(chunks, vec!["a red car parked near the beach".to_string()]);
    }

    #[test]
    fn test_exact_size_single_chunk() {
        let text = "x".repeat(CHUNK_SIZE);
        let chunks = chunk_with(&text, CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_long_text_overlapping_chunks() {
        let text = "ab".repeat(600); // 1200 chars
        let chunks = chunk_with(&text, 512, 32);

        assert!(chunks.len() > 1);
        // Consecutive chunks share an overlap region
        let first_tail: String = chunks[0].chars().rev().take(32).collect();
        let second_head: String = chunks[1].chars().take(32).collect();
        let first_tail: String = first_tail.chars().rev().collect();
        assert_eq!(first_tail, second_head);
    }

    #[test]
    fn test_all_content_covered() {
        let text: String = (0..2000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_with(&text, 512, 32);

        let last = chunks.last().unwrap();
        assert!(text.ends_with(last.as_str()));
        assert!(text.starts_with(chunks[0].as_str()));
    }

    #[test]
    fn test_trims_input() {
        let chunks = chunk_with("  hello  ", CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "картинка с красной машиной ".repeat(40);
        let chunks = chunk_with(&text, 512, 32);
        assert!(!chunks.is_empty());
    }
}
