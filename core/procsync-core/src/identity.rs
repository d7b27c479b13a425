//! Deterministic supervisor process names for projects.
//!
//! The key is the literal name a project's process is registered under, so it
//! must be stable across restarts and depend on nothing but (name, path).
//! Two projects whose keys collide would see each other's process; with a
//! 32-bit hash that is possible but unlikely, and not detectable here.

use procsync_supervisor_protocol::MAX_PROCESS_NAME_LEN;

const SEPARATOR: char = '\0';
const PREFIX_LEN: usize = 6;
const FALLBACK_PREFIX: &str = "p";
const PAD: char = '0';

/// Maps a project's (name, path) to its supervisor process name.
///
/// Always exactly 16 lowercase ASCII alphanumerics: up to six characters of
/// the sanitized name followed by the base-36 hash, padded with `0`.
pub fn process_key(name: &str, path: &str) -> String {
    let combined = format!("{}{}{}", name, SEPARATOR, path);
    let hash = rolling_hash(&combined).unsigned_abs();

    let prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(PREFIX_LEN)
        .collect();
    let prefix = if prefix.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        prefix
    };

    let mut key = format!("{}{}", prefix, to_base36(hash));
    key.truncate(MAX_PROCESS_NAME_LEN);
    while key.len() < MAX_PROCESS_NAME_LEN {
        key.push(PAD);
    }
    key
}

/// `h = h * 31 + c` with 32-bit wrapping, over Unicode scalar values.
fn rolling_hash(input: &str) -> i32 {
    input.chars().fold(0i32, |hash, c| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as u32 as i32)
    })
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(key: &str) {
        assert_eq!(key.len(), MAX_PROCESS_NAME_LEN, "key {key:?}");
        assert!(
            key.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()),
            "key {key:?} has non lowercase-alphanumeric characters"
        );
    }

    #[test]
    fn key_is_deterministic() {
        let first = process_key("my-app", "/home/dev/my-app");
        let second = process_key("my-app", "/home/dev/my-app");
        assert_eq!(first, second);
        assert!(first.starts_with("myapp"));
    }

    #[test]
    fn same_name_different_path_differs() {
        assert_ne!(process_key("demo", "/p/a"), process_key("demo", "/p/b"));
    }

    #[test]
    fn separator_keeps_boundaries_unambiguous() {
        assert_ne!(process_key("ab", "c/d"), process_key("abc", "/d"));
    }

    #[test]
    fn keys_are_bounded_and_lowercase() {
        let cases = [
            ("demo", "/p/a"),
            ("", "/"),
            ("___", "/tmp/x"),
            ("Very Long Project Name With Spaces", "/Users/me/code/very/long"),
            ("日本語プロジェクト", "/home/ユーザー/app"),
            ("UPPER", "C:\\Projects\\Upper"),
        ];
        for (name, path) in cases {
            assert_well_formed(&process_key(name, path));
        }
    }

    #[test]
    fn empty_name_uses_fallback_prefix() {
        assert!(process_key("", "/p/a").starts_with(FALLBACK_PREFIX));
        assert!(process_key("---", "/p/a").starts_with(FALLBACK_PREFIX));
    }

    #[test]
    fn prefix_is_sanitized_name() {
        let key = process_key("My_Web.App", "/srv/web");
        assert_eq!(&key[..6], "myweba");
    }

    #[test]
    fn hash_handles_minimum_value() {
        assert_eq!(to_base36(i32::MIN.unsigned_abs()), "zik0zk");
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn rolling_hash_matches_reference_values() {
        assert_eq!(rolling_hash(""), 0);
        assert_eq!(rolling_hash("a"), 97);
        assert_eq!(rolling_hash("ab"), 97 * 31 + 98);
    }
}
