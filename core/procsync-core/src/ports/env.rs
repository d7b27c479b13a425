//! Environment-style `KEY=value` files.

use std::path::Path;

use super::{parse_port, read_evidence, report_malformed};
use crate::fs::ProjectFs;
use crate::types::{Confidence, PortOrigin, PortSource};

/// From least to most specific; a later file overrides an earlier one.
pub const ENV_FILES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.development",
    ".env.development.local",
];

pub const PORT_KEYS: &[&str] = &["PORT", "DEV_PORT", "APP_PORT", "SERVER_PORT", "VITE_PORT"];

/// Sources from the most specific file come first, so they win ties.
pub(super) async fn scan(fs: &dyn ProjectFs, root: &Path) -> Vec<PortSource> {
    let mut sources = Vec::new();
    for name in ENV_FILES.iter().rev() {
        let path = root.join(name);
        let Some(content) = read_evidence(fs, &path).await else {
            continue;
        };
        for port in parse_env_ports_logged(&content, &path) {
            sources.push(PortSource {
                origin: PortOrigin::EnvFile,
                port,
                file: path.clone(),
                confidence: Confidence::High,
            });
        }
    }
    sources
}

/// Port values assigned to any of [`PORT_KEYS`], in file order.
pub fn parse_env_ports(content: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for (key, value) in assignments(content) {
        if !PORT_KEYS.contains(&key) {
            continue;
        }
        if let Some(port) = parse_port(value) {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
    }
    ports
}

fn parse_env_ports_logged(content: &str, path: &Path) -> Vec<u16> {
    for (key, value) in assignments(content) {
        if PORT_KEYS.contains(&key) && parse_port(value).is_none() && !value.is_empty() {
            report_malformed(path, format!("{} is not a port: {}", key, value));
        }
    }
    parse_env_ports(content)
}

fn assignments(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line.split_once('=')?;
        Some((key.trim(), clean_value(value)))
    })
}

fn clean_value(raw: &str) -> &str {
    let value = raw.trim();
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            return rest.split(quote).next().unwrap_or("").trim();
        }
    }
    match value.find(" #") {
        Some(idx) => value[..idx].trim(),
        None => value,
    }
}

/// Sets `PORT=<port>` in env file content, keeping every other line.
///
/// The first `PORT` assignment is rewritten in place (an `export ` prefix is
/// kept); when there is none the assignment is appended.
pub fn set_env_port(content: &str, port: u16) -> String {
    let mut replaced = false;
    let mut lines: Vec<String> = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        let (prefix, rest) = match trimmed.strip_prefix("export ") {
            Some(rest) => ("export ", rest),
            None => ("", trimmed),
        };
        let is_port = rest
            .split_once('=')
            .map(|(key, _)| key.trim() == "PORT")
            .unwrap_or(false);
        if is_port && !replaced {
            lines.push(format!("{}PORT={}", prefix, port));
            replaced = true;
        } else {
            lines.push(line.to_string());
        }
    }
    if !replaced {
        lines.push(format!("PORT={}", port));
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

/// Rewrites every [`PORT_KEYS`] assignment holding `from` to hold `to`.
///
/// Returns `None` when no assignment holds `from`. An `export ` prefix is
/// kept; quoting and trailing comments on rewritten lines are dropped.
pub fn replace_env_port(content: &str, from: u16, to: u16) -> Option<String> {
    let mut replaced = false;
    let mut lines: Vec<String> = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        let (prefix, rest) = match trimmed.strip_prefix("export ") {
            Some(rest) => ("export ", rest),
            None => ("", trimmed),
        };
        let rewritten = match rest.split_once('=') {
            Some((key, value))
                if !trimmed.starts_with('#')
                    && PORT_KEYS.contains(&key.trim())
                    && parse_port(clean_value(value)) == Some(from) =>
            {
                Some(format!("{}{}={}", prefix, key.trim(), to))
            }
            _ => None,
        };
        match rewritten {
            Some(line) => {
                replaced = true;
                lines.push(line);
            }
            None => lines.push(line.to_string()),
        }
    }
    if !replaced {
        return None;
    }

    let mut output = lines.join("\n");
    output.push('\n');
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_keys_with_decorations() {
        let content = r#"
# comment
PORT=3000
export DEV_PORT=3001
APP_PORT="3002"
SERVER_PORT='3003' # quoted
VITE_PORT=3004 # trailing
DATABASE_URL=postgres://localhost:5432/db
PORT=3000
"#;
        assert_eq!(parse_env_ports(content), vec![3000, 3001, 3002, 3003, 3004]);
    }

    #[test]
    fn skips_invalid_values() {
        assert!(parse_env_ports("PORT=abc\nPORT=70000\nPORT=\n").is_empty());
    }

    #[test]
    fn set_env_port_rewrites_existing_line() {
        let updated = set_env_port("NAME=api\nexport PORT=3000\nDEBUG=1", 3006);
        assert_eq!(updated, "NAME=api\nexport PORT=3006\nDEBUG=1\n");
    }

    #[test]
    fn set_env_port_appends_when_missing() {
        assert_eq!(set_env_port("", 3006), "PORT=3006\n");
        assert_eq!(set_env_port("NAME=api\n", 3006), "NAME=api\nPORT=3006\n");
    }

    #[test]
    fn replace_env_port_rewrites_the_key_that_holds_the_port() {
        let content = "# VITE_PORT=3000\nexport VITE_PORT=\"3000\" # dev\nAPP_PORT=4000\n";
        assert_eq!(
            replace_env_port(content, 3000, 3001).as_deref(),
            Some("# VITE_PORT=3000\nexport VITE_PORT=3001\nAPP_PORT=4000\n")
        );
        assert_eq!(replace_env_port(content, 5000, 5001), None);
    }

    #[test]
    fn set_env_port_leaves_other_port_keys() {
        let updated = set_env_port("DEV_PORT=4000\n", 3006);
        assert_eq!(updated, "DEV_PORT=4000\nPORT=3006\n");
    }
}
