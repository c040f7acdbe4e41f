//! Small helpers shared across the crate.

/// Truncates a string to at most `max_chars` characters, appending "..." when
/// anything was cut. UTF-8 safe: counts characters, not bytes.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    // Byte length is a cheap upper bound on the char count.
    if s.len() <= max_chars {
        return s.to_string();
    }
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return s.chars().take(max_chars).collect();
    }
    let mut out: String = s.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::truncate_str;

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("", 4), "");
    }

    #[test]
    fn long_strings_get_ellipsis() {
        assert_eq!(truncate_str("hello world", 8), "hello...");
    }

    #[test]
    fn multibyte_boundaries_are_respected() {
        // Each crab is one char but four bytes.
        assert_eq!(truncate_str("🦀🦀🦀🦀🦀", 4), "🦀...");
        assert_eq!(truncate_str("🦀🦀", 2), "🦀🦀");
    }
}
