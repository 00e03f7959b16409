//! Ordering of package version strings.
//!
//! Versions have the form `[epoch:]upstream[-revision]`. Epochs compare
//! numerically; upstream and revision compare piecewise, alternating between
//! non-digit runs (compared character by character) and digit runs (compared
//! numerically). In non-digit runs `~` sorts before everything including the
//! end of the string, and letters sort before all other characters.

use std::cmp::Ordering;

struct VersionParts<'a> {
    epoch: u64,
    upstream: &'a str,
    revision: &'a str,
}

impl<'a> VersionParts<'a> {
    fn split(version: &'a str) -> Self {
        let version = version.trim();

        let (epoch, rest) = match version.split_once(':') {
            Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
                (epoch.parse().unwrap_or(u64::MAX), rest)
            }
            _ => (0, version),
        };

        let (upstream, revision) = match rest.rfind('-') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, ""),
        };

        Self {
            epoch,
            upstream,
            revision,
        }
    }
}

/// Compares two version strings.
///
/// This is a total preorder usable with `sort_by`: distinct strings such as
/// `1.0`, `1.00` and `0:1.0` compare equal, so callers needing a stable
/// output order must break ties themselves. Malformed versions never fail;
/// they are compared by the same piecewise rules.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use bolt_package::version::compare_versions;
///
/// assert_eq!(compare_versions("1.0", "1.2~rc1"), Ordering::Less);
/// assert_eq!(compare_versions("1.2~rc1", "2.0"), Ordering::Less);
/// assert_eq!(compare_versions("1:0.9", "2.0"), Ordering::Greater);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = VersionParts::split(a);
    let b = VersionParts::split(b);

    a.epoch
        .cmp(&b.epoch)
        .then_with(|| compare_fragment(a.upstream, b.upstream))
        .then_with(|| compare_fragment(a.revision, b.revision))
}

fn char_order(c: Option<&u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => *c as i32,
        Some(c) => *c as i32 + 256,
    }
}

fn compare_fragment(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    let is_digit = |s: &[u8], k: usize| s.get(k).is_some_and(u8::is_ascii_digit);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !is_digit(a, i)) || (j < b.len() && !is_digit(b, j)) {
            let (ac, bc) = (char_order(a.get(i)), char_order(b.get(j)));
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while is_digit(a, i) && is_digit(b, j) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }

        if is_digit(a, i) {
            return Ordering::Greater;
        }
        if is_digit(b, j) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tilde_sorts_before_release() {
        assert_eq!(compare_versions("1.2~rc1", "1.2"), Ordering::Less);
        assert_eq!(compare_versions("1.2~rc1", "1.2~rc2"), Ordering::Less);
        assert_eq!(compare_versions("1.2~~", "1.2~"), Ordering::Less);
    }

    #[test]
    fn test_sort_order_not_lexical() {
        let mut versions = vec!["2.0", "1.2~rc1", "1.0", "1.10", "1.9"];
        versions.sort_by(|a, b| compare_versions(a, b));
        assert_eq!(versions, vec!["1.0", "1.2~rc1", "1.9", "1.10", "2.0"]);
    }

    #[test]
    fn test_epoch_dominates() {
        assert_eq!(compare_versions("1:0.1", "9.9"), Ordering::Greater);
        assert_eq!(compare_versions("0:1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn test_revision() {
        assert_eq!(compare_versions("1.0-1", "1.0-2"), Ordering::Less);
        assert_eq!(compare_versions("1.0-10", "1.0-9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0-0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0-rc-1", "1.0-rc-2"), Ordering::Less);
    }

    #[test]
    fn test_letters_before_symbols() {
        assert_eq!(compare_versions("1.0a", "1.0+"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0a"), Ordering::Less);
        assert_eq!(compare_versions("1.0a", "1.0b"), Ordering::Less);
    }

    #[test]
    fn test_leading_zeros_ignored() {
        assert_eq!(compare_versions("1.01", "1.1"), Ordering::Equal);
        assert_eq!(compare_versions("1.000", "1.0"), Ordering::Equal);
    }
}
