//! Hierarchical parameter names and name patterns.
//!
//! Names are dot-delimited (`top.module.param`); there are no escaping rules
//! for embedded dots. Patterns use `*` as a full-segment wildcard that stands
//! for one or more segments:
//!
//! - `*` matches every name
//! - `mod.*` matches every descendant of `mod` (but not `mod` itself)
//! - `*.param` matches every name whose last segment is `param`
//! - `a.*.c` matches `a.b.c` and `a.b.x.c`
//!
//! Anything without a `*` segment is an exact match.

pub const SEPARATOR: char = '.';

const WILDCARD: &str = "*";

/// Join a hierarchy prefix and a local name. An empty prefix yields `name`.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, SEPARATOR, name)
    }
}

/// Everything before the last separator, or `None` for a top-level name.
pub fn parent(name: &str) -> Option<&str> {
    name.rfind(SEPARATOR).map(|pos| &name[..pos])
}

/// Last segment of a hierarchical name.
pub fn basename(name: &str) -> &str {
    name.rfind(SEPARATOR)
        .map(|pos| &name[pos + 1..])
        .unwrap_or(name)
}

/// Whether `s` contains at least one wildcard segment.
pub fn is_pattern(s: &str) -> bool {
    s.split(SEPARATOR).any(|seg| seg == WILDCARD)
}

/// Check whether `name` matches `pattern`. The empty pattern matches everything.
pub fn matches(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    if !is_pattern(pattern) {
        return pattern == name;
    }
    let pattern: Vec<&str> = pattern.split(SEPARATOR).collect();
    let segments: Vec<&str> = name.split(SEPARATOR).collect();
    match_segments(&pattern, &segments)
}

fn match_segments(pattern: &[&str], segments: &[&str]) -> bool {
    match pattern.split_first() {
        None => segments.is_empty(),
        Some((&WILDCARD, rest)) => {
            // `*` consumes at least one segment
            (1..=segments.len()).any(|taken| match_segments(rest, &segments[taken..]))
        }
        Some((literal, rest)) => match segments.split_first() {
            Some((segment, remaining)) => segment == literal && match_segments(rest, remaining),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join("", "p"), "p");
        assert_eq!(join("top.sub", "p"), "top.sub.p");
        assert_eq!(parent("top.sub.p"), Some("top.sub"));
        assert_eq!(parent("p"), None);
        assert_eq!(basename("top.sub.p"), "p");
        assert_eq!(basename("p"), "p");
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "a.b.c"));
        assert!(!matches("a", "ab"));
    }

    #[test]
    fn test_prefix_wildcard() {
        assert!(matches("mod.*", "mod.p"));
        assert!(matches("mod.*", "mod.sub.p"));
        assert!(!matches("mod.*", "mod"));
        assert!(!matches("mod.*", "module.p"));
    }

    #[test]
    fn test_suffix_wildcard() {
        assert!(matches("*.cache_size", "top.cache_size"));
        assert!(matches("*.cache_size", "top.cpu.cache_size"));
        assert!(!matches("*.cache_size", "cache_size"));
        assert!(!matches("*.cache_size", "top.cache_size_kb"));
    }

    #[test]
    fn test_inner_wildcard() {
        assert!(matches("a.*.c", "a.b.c"));
        assert!(matches("a.*.c", "a.b.x.c"));
        assert!(!matches("a.*.c", "a.c"));
    }

    #[test]
    fn test_match_all() {
        assert!(matches("*", "p"));
        assert!(matches("*", "a.b.c"));
        assert!(matches("", "a.b.c"));
    }
}
