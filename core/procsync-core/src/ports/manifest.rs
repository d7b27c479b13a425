//! Port flags in `package.json` scripts.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::path::Path;

use super::{parse_port, read_evidence, report_malformed};
use crate::fs::ProjectFs;
use crate::types::{Confidence, PortOrigin, PortSource};

static PORT_FLAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:--port(?:=|\s+)|(?:^|\s)-p\s+)(\d{1,5})\b").expect("valid port flag regex")
});

static PORT_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bPORT=(\d{1,5})\b").expect("valid port assignment regex"));

pub(super) async fn scan(fs: &dyn ProjectFs, root: &Path) -> Vec<PortSource> {
    let path = root.join("package.json");
    let Some(content) = read_evidence(fs, &path).await else {
        return Vec::new();
    };

    let manifest: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            report_malformed(&path, err.to_string());
            return Vec::new();
        }
    };

    let mut ports: Vec<u16> = Vec::new();
    for command in ordered_scripts(&manifest) {
        for port in script_ports(command) {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
    }

    ports
        .into_iter()
        .map(|port| PortSource {
            origin: PortOrigin::PackageScript,
            port,
            file: path.clone(),
            confidence: Confidence::Medium,
        })
        .collect()
}

/// Script commands with `dev` and `start` first, the rest by name.
fn ordered_scripts(manifest: &Value) -> Vec<&str> {
    let Some(scripts) = manifest.get("scripts").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut named: Vec<(&String, &str)> = scripts
        .iter()
        .filter_map(|(name, command)| command.as_str().map(|c| (name, c)))
        .collect();
    named.sort_by_key(|(name, _)| match name.as_str() {
        "dev" => (0, String::new()),
        "start" => (1, String::new()),
        other => (2, other.to_string()),
    });
    named.into_iter().map(|(_, command)| command).collect()
}

/// Ports named on one script command line.
pub(crate) fn script_ports(command: &str) -> Vec<u16> {
    PORT_FLAG
        .captures_iter(command)
        .chain(PORT_ASSIGNMENT.captures_iter(command))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| parse_port(m.as_str()))
        .collect()
}

/// Rewrites port flags and `PORT=` assignments naming `from` in raw
/// `package.json` text, leaving the rest of the file untouched.
///
/// Returns `None` when nothing names `from`.
pub fn replace_script_port(content: &str, from: u16, to: u16) -> Option<String> {
    let mut replaced = false;
    let mut output = content.to_string();
    for pattern in [&*PORT_FLAG, &*PORT_ASSIGNMENT] {
        output = pattern
            .replace_all(&output, |caps: &Captures| {
                let whole = &caps[0];
                match caps.get(1) {
                    Some(port) if parse_port(port.as_str()) == Some(from) => {
                        replaced = true;
                        let offset = port.start() - caps.get(0).map_or(0, |m| m.start());
                        format!(
                            "{}{}{}",
                            &whole[..offset],
                            to,
                            &whole[offset + port.len()..]
                        )
                    }
                    _ => whole.to_string(),
                }
            })
            .into_owned();
    }
    replaced.then_some(output)
}
