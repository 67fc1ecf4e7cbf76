//! Sequence-tagged messages
//!
//! Fixed-width messages that name their sender and position, so a reader of
//! the log file can check per-client ordering:
//!
//! ```text
//! 000003 00000042 aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa...
//! ^client ^sequence ^filler up to the requested width
//! ```

/// Length of the `client sequence ` prefix
pub const TAG_LEN: usize = 16;

/// Build a message of exactly `width` bytes (or [`TAG_LEN`] if `width` is smaller)
pub fn tagged_message(client: u32, seq: u64, width: usize) -> Vec<u8> {
    let mut message = format!("{:06} {:08} ", client % 1_000_000, seq % 100_000_000).into_bytes();
    if width > message.len() {
        message.resize(width, b'a');
    }
    message
}

/// Recover `(client, sequence)` from a tagged line
pub fn parse_tag(line: &[u8]) -> Option<(u32, u64)> {
    let head = std::str::from_utf8(line.get(..TAG_LEN)?).ok()?;
    let mut parts = head.split(' ');
    let client = parts.next()?.parse().ok()?;
    let seq = parts.next()?.parse().ok()?;
    Some((client, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_message_width() {
        let message = tagged_message(3, 42, 128);
        assert_eq!(message.len(), 128);
        assert!(message.starts_with(b"000003 00000042 aaa"));
    }

    #[test]
    fn test_tagged_message_narrower_than_tag() {
        let message = tagged_message(1, 1, 4);
        assert_eq!(message.len(), TAG_LEN);
    }

    #[test]
    fn test_parse_tag() {
        let message = tagged_message(17, 99, 64);
        assert_eq!(parse_tag(&message), Some((17, 99)));
        assert_eq!(parse_tag(b"hello"), None);
        assert_eq!(parse_tag(b"xxxxxx yyyyyyyy zzz"), None);
    }
}
