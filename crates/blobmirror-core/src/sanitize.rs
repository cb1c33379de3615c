//! Name sanitization for restrictive storage backends.
//!
//! Cloud storage backends reject a handful of punctuation characters, any
//! character outside the Basic Multilingual Plane, and names ending in a dot
//! or a space. Offending characters are replaced by a percent escape of
//! their code point.
//!
//! A literal `%` is never escaped, so the transform is not idempotent and two
//! distinct inputs may produce the same output (`a:` and `a%3A`). Blob naming
//! handles such clashes with numeric suffixes.

use tracing::debug;

/// Characters that may not appear in a stored name.
pub const FORBIDDEN_CHARS: [char; 9] = ['"', '*', '/', ':', '<', '>', '?', '\\', '|'];

/// Highest code point stored verbatim.
const MAX_PLAIN_CODE_POINT: u32 = 0xFFFF;

/// Escape a single character.
///
/// The code point is rendered in hex with `h` digits and prefixed by `h / 2`
/// percent signs, so two-digit values get one `%`, five-digit values get two.
pub fn encode_char(c: char) -> String {
    let hex = format!("{:X}", c as u32);
    let mut out = "%".repeat(hex.len() / 2);
    out.push_str(&hex);
    out
}

fn needs_escape(c: char) -> bool {
    FORBIDDEN_CHARS.contains(&c) || c as u32 > MAX_PLAIN_CODE_POINT
}

/// Turn `name` into something the storage backend accepts.
pub fn sanitize(name: &str) -> String {
    // An escaped char always ends in a hex digit, so only a verbatim final
    // char can be a trailing dot or space.
    let last_index = name.chars().count().checked_sub(1);

    let mut sanitized = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        let trailing = Some(i) == last_index && (c == '.' || c == ' ');
        if needs_escape(c) || trailing {
            sanitized.push_str(&encode_char(c));
        } else {
            sanitized.push(c);
        }
    }

    if sanitized != name {
        debug!("=== sanitized name {:?} -> {:?}", name, sanitized);
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_untouched() {
        assert_eq!(sanitize("photos 2019"), "photos 2019");
        assert_eq!(sanitize("ñandú"), "ñandú");
    }

    #[test]
    fn test_forbidden_ascii() {
        assert_eq!(sanitize("a:b"), "a%3Ab");
        assert_eq!(sanitize("what?"), "what%3F");
        assert_eq!(sanitize(r#"x"y"#), "x%22y");
        assert_eq!(sanitize("a/b\\c|d"), "a%2Fb%5Cc%7Cd");
    }

    #[test]
    fn test_no_forbidden_char_survives() {
        for c in FORBIDDEN_CHARS {
            let sanitized = sanitize(&format!("x{c}y"));
            assert!(!sanitized.contains(c), "{c:?} left in {sanitized:?}");
            assert_eq!(sanitized, format!("x{}y", encode_char(c)));
        }
    }

    #[test]
    fn test_outside_bmp_uses_two_percent_signs() {
        assert_eq!(sanitize("smile😀"), "smile%%1F600");
        assert_eq!(encode_char('\u{10FFFF}'), "%%%10FFFF");
    }

    #[test]
    fn test_trailing_dot_and_space() {
        assert_eq!(sanitize("name."), "name%2E");
        assert_eq!(sanitize("name "), "name%20");
        assert_eq!(sanitize("a.b"), "a.b");
        assert_eq!(sanitize(" lead"), " lead");
    }

    #[test]
    fn test_escaped_trailing_char_not_reescaped() {
        // the final char after escaping is a hex digit, not a dot
        assert_eq!(sanitize("end?"), "end%3F");
    }

    #[test]
    fn test_empty() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_percent_is_not_escaped() {
        assert_eq!(sanitize("a:"), sanitize("a%3A"));
    }
}
