//! List marker recognition.

use crate::model::ListMarker;

const BULLETS: &[char] = &[
    '-', '–', '—', '•', '·', '*', '○', '▪', '◦', '▸', '▹', '►', '■', '●', '□', '◆', '◇', '▶',
    '▷', '➤', '➜',
];

/// Check if text is a bullet marker (•, -, etc.).
pub fn is_bullet_marker(text: &str) -> bool {
    let mut chars = text.trim().chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if BULLETS.contains(&c))
}

/// Check if text is a number-style list marker (1., 2), a., etc.).
pub fn is_number_marker(text: &str) -> bool {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return false;
    }

    if let Some(pos) = cleaned.find(|c: char| !c.is_ascii_digit()) {
        let suffix = &cleaned[pos..];
        if pos > 0 && (suffix == "." || suffix == ")") {
            return true;
        }
    }

    if cleaned.parse::<u32>().is_ok() {
        return true;
    }

    let chars: Vec<char> = cleaned.chars().collect();
    chars.len() == 2 && chars[0].is_alphabetic() && (chars[1] == '.' || chars[1] == ')')
}

/// Check if a text string looks like a list marker (number, bullet, etc.).
pub fn is_list_marker(text: &str) -> bool {
    is_bullet_marker(text) || is_number_marker(text)
}

/// Split a leading list marker off a line of text.
///
/// The marker must be followed by whitespace. Returns the marker and the
/// remaining text.
pub fn parse_marker(text: &str) -> Option<(ListMarker, &str)> {
    let text = text.trim_start();
    let split = text.find(char::is_whitespace)?;
    let (head, rest) = text.split_at(split);
    let rest = rest.trim_start();
    if rest.is_empty() {
        return None;
    }

    let mut chars = head.chars();
    let first = chars.next()?;

    if head.chars().count() == 1 && BULLETS.contains(&first) {
        return Some((ListMarker::Bullet(first), rest));
    }

    let body = head.strip_suffix('.').or_else(|| head.strip_suffix(')'))?;
    if !body.is_empty() && body.len() <= 3 && body.chars().all(|c| c.is_ascii_digit()) {
        let n = body.parse().ok()?;
        return Some((ListMarker::Numbered(n), rest));
    }

    let mut body_chars = body.chars();
    match (body_chars.next(), body_chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() && starts_with_word(rest) => {
            Some((ListMarker::Lettered(c), rest))
        }
        _ => None,
    }
}

fn starts_with_word(rest: &str) -> bool {
    rest.chars().next().is_some_and(|c| c.is_alphanumeric())
}
