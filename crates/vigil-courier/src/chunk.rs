//! Message chunking — split oversized bodies below the transport limit.

/// Split `text` into chunks of at most `limit` bytes.
///
/// Prefers cutting at the last newline at or before the limit so paragraph
/// structure survives; falls back to a hard cut when a span has no newline.
/// Leading whitespace on continuation chunks is stripped — a known lossy
/// transform: the exact original cannot always be reassembled byte-for-byte.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() <= limit {
            chunks.push(rest.to_string());
            break;
        }
        let window = floor_char_boundary(rest, limit);
        let cut = match rest[..window].rfind('\n') {
            Some(i) if i > 0 => i,
            _ => window,
        };
        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start();
    }
    chunks
}

/// Largest index `<= i` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 4000;

    #[test]
    fn test_short_text_is_identity() {
        let text = "hello world";
        assert_eq!(split_message(text, LIMIT), vec![text.to_string()]);

        let exactly = "x".repeat(LIMIT);
        assert_eq!(split_message(&exactly, LIMIT), vec![exactly.clone()]);
    }

    #[test]
    fn test_splits_at_newlines() {
        // 9000 chars with newlines at 3900 and 7950
        let mut text = "a".repeat(3900);
        text.push('\n');
        text.push_str(&"b".repeat(4049));
        text.push('\n');
        text.push_str(&"c".repeat(1049));
        assert_eq!(text.len(), 9000);

        let chunks = split_message(&text, LIMIT);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.len() <= LIMIT);
        }
        assert_eq!(chunks[0], "a".repeat(3900));
        // first span cuts at the newline; the second has none in its window,
        // so it falls back to a hard cut
        assert_eq!(chunks[1].len(), 4000);

        // only the newline at 3900 was stripped; reinserting it reconstructs
        // the original exactly
        let rebuilt = format!("{}\n{}{}", chunks[0], chunks[1], chunks[2]);
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_hard_cut_without_newline() {
        let text = "A".repeat(5000);
        let chunks = split_message(&text, LIMIT);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_never_cuts_inside_a_char() {
        // multi-byte chars straddling the limit must not split mid-char
        let text = "é".repeat(3000); // 6000 bytes
        let chunks = split_message(&text, LIMIT);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= LIMIT);
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
        assert_eq!(chunks.concat(), text);
    }
}
