//! Hosts composition
//!
//! Concatenates the common block and the active profiles in catalog order.
//! Duplicate host entries are left in place; the system resolver decides
//! which one wins.

use sha2::{Digest, Sha256};

use crate::profile::Profile;

/// Compose the effective hosts text
///
/// Output is `common`, then one `### Profile: <name> ###` section per active
/// profile. With no active profiles the output is exactly `common`.
pub fn compose(common: &str, active: &[Profile]) -> String {
    let mut out = String::from(common);
    if active.is_empty() {
        return out;
    }

    for profile in active {
        out.push_str("\n\n### Profile: ");
        push_header_name(&mut out, &profile.name);
        out.push_str(" ###\n");
        out.push_str(&profile.content);
    }

    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// The header is a comment line; a line break in the name would end it and
/// turn the rest of the name into a live hosts rule
fn push_header_name(out: &mut String, name: &str) {
    out.extend(name.chars().map(|c| match c {
        '\r' | '\n' => ' ',
        other => other,
    }));
}

/// Content hash of composed text, used to detect real changes
pub fn content_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_metadata::ProfileSource;

    fn profile(name: &str, content: &str) -> Profile {
        Profile {
            id: name.to_lowercase(),
            name: name.to_string(),
            content: content.to_string(),
            active: true,
            source: ProfileSource::Local,
            last_update: None,
        }
    }

    #[test]
    fn test_empty_active_set_is_common() {
        for common in ["", "127.0.0.1 localhost", "# a\n# b\n\n"] {
            assert_eq!(compose(common, &[]), common);
        }
    }

    #[test]
    fn test_sections_follow_given_order() {
        let out = compose(
            "127.0.0.1 localhost",
            &[profile("Dev", "10.0.0.1 api"), profile("Ads", "0.0.0.0 ads\n")],
        );
        assert_eq!(
            out,
            concat!(
                "127.0.0.1 localhost",
                "\n\n### Profile: Dev ###\n10.0.0.1 api",
                "\n\n### Profile: Ads ###\n0.0.0.0 ads\n",
            )
        );
    }

    #[test]
    fn test_duplicates_are_kept() {
        let out = compose(
            "",
            &[profile("A", "1.1.1.1 same"), profile("B", "2.2.2.2 same")],
        );
        let first = out.find("1.1.1.1 same").unwrap();
        let second = out.find("2.2.2.2 same").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_line_breaks_in_name_stay_in_header() {
        let out = compose(
            "",
            &[profile("Dev ###\n0.0.0.0 github.com\r\n#", "10.0.0.1 api")],
        );
        assert_eq!(
            out,
            "\n\n### Profile: Dev ### 0.0.0.0 github.com  # ###\n10.0.0.1 api\n"
        );
        assert!(out
            .lines()
            .filter(|line| !line.trim().is_empty())
            .all(|line| line.starts_with('#') || line == "10.0.0.1 api"));
    }

    #[test]
    fn test_deterministic() {
        let active = [profile("A", "a"), profile("B", "b")];
        let one = compose("c", &active);
        let two = compose("c", &active);
        assert_eq!(one, two);
        assert_eq!(content_digest(&one), content_digest(&two));
    }

    #[test]
    fn test_digest_format() {
        let digest = content_digest("");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), "sha256:".len() + 64);
        assert_ne!(digest, content_digest("x"));
    }
}
