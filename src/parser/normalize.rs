//! Text normalization applied to every extracted run.

use unicode_normalization::UnicodeNormalization;

/// Expand typographic ligatures, drop control characters and compose to NFC.
pub fn normalize_text(text: &str) -> String {
    let mut expanded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{FB00}' => expanded.push_str("ff"),
            '\u{FB01}' => expanded.push_str("fi"),
            '\u{FB02}' => expanded.push_str("fl"),
            '\u{FB03}' => expanded.push_str("ffi"),
            '\u{FB04}' => expanded.push_str("ffl"),
            '\u{FB05}' | '\u{FB06}' => expanded.push_str("st"),
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => expanded.push(' '),
            '\u{00AD}' | '\u{200B}' | '\u{FEFF}' => {}
            c if c.is_control() && c != '\t' => {}
            c => expanded.push(c),
        }
    }
    expanded.nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ligatures() {
        assert_eq!(normalize_text("\u{FB01}nal \u{FB02}ow"), "final flow");
        assert_eq!(normalize_text("e\u{FB03}cient"), "efficient");
    }

    #[test]
    fn test_nfc() {
        // e + combining acute
        assert_eq!(normalize_text("caf\u{0065}\u{0301}"), "caf\u{00E9}");
    }

    #[test]
    fn test_invisible_characters() {
        assert_eq!(normalize_text("soft\u{00AD}hyphen\u{0007}"), "softhyphen");
        assert_eq!(normalize_text("a\u{00A0}b"), "a b");
    }
}
