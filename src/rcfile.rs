//! Line scan over `.yarnrc.yml`.
//!
//! The one piece of information the checker needs from the rc file is
//! the `yarnPath:` entry. A full YAML parser would be overkill for a
//! single `key: value` line, so this scans lines directly.

/// The rc-file key whose value points at the vendored release file.
pub const YARN_PATH_KEY: &str = "yarnPath";

/// Find the value of the first `<key>: <value>` line, if any.
///
/// The key must start the line (leading whitespace is tolerated) and be
/// followed by a colon. Surrounding quotes on the value are stripped.
pub fn find_value<'a>(contents: &'a str, key: &str) -> Option<&'a str> {
    contents
        .lines()
        .find_map(|line| {
            let rest = line.trim_start().strip_prefix(key)?;
            let rest = rest.trim_start().strip_prefix(':')?;
            Some(rest.trim().trim_matches('"'))
        })
        .filter(|value| !value.is_empty())
}
