//! Simple wildcard matching used by node descriptors and attribute filters.
//!
//! Only `*` is special: it matches any sequence of characters, including the
//! empty one. Every other character matches itself.

/// Check whether `value` matches the simple wildcard `pattern`
#[must_use]
pub fn simple_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut p, mut v) = (0, 0);
    // Position of the last `*` seen in the pattern, and the value position it
    // was matched against, for backtracking.
    let mut star: Option<(usize, usize)> = None;

    while v < value.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, v));
            p += 1;
        } else if p < pattern.len() && pattern[p] == value[v] {
            p += 1;
            v += 1;
        } else if let Some((star_p, star_v)) = star {
            p = star_p + 1;
            v = star_v + 1;
            star = Some((star_p, star_v + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Whether the string contains a wildcard
#[must_use]
pub fn is_simple_pattern(value: &str) -> bool {
    value.contains('*')
}
