//! Build-tool and framework configuration files.
//!
//! Only explicit `port` settings count. A config that relies on the
//! framework's built-in default contributes nothing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

use super::{parse_port, read_evidence, report_malformed};
use crate::fs::ProjectFs;
use crate::types::{Confidence, PortOrigin, PortSource};

pub const FRAMEWORK_CONFIGS: &[&str] = &[
    "vite.config.ts",
    "vite.config.js",
    "vite.config.mjs",
    "vite.config.mts",
    "vue.config.js",
    "webpack.config.js",
    "nuxt.config.ts",
    "nuxt.config.js",
    "astro.config.mjs",
    "astro.config.ts",
];

const ANGULAR_CONFIG: &str = "angular.json";

static PORT_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[^/\n]*?\b["']?port["']?\s*:\s*(\d{1,5})\b"#).expect("valid port regex")
});

pub(super) async fn scan(fs: &dyn ProjectFs, root: &Path) -> Vec<PortSource> {
    let mut sources = Vec::new();

    for name in FRAMEWORK_CONFIGS {
        let path = root.join(name);
        let Some(content) = read_evidence(fs, &path).await else {
            continue;
        };
        if let Some(port) = config_port(&content) {
            sources.push(source(port, &path));
        }
    }

    let angular = root.join(ANGULAR_CONFIG);
    if let Some(content) = read_evidence(fs, &angular).await {
        match serde_json::from_str::<Value>(&content) {
            Ok(workspace) => {
                for port in angular_ports(&workspace) {
                    sources.push(source(port, &angular));
                }
            }
            Err(err) => report_malformed(&angular, err.to_string()),
        }
    }

    sources
}

fn source(port: u16, path: &Path) -> PortSource {
    PortSource {
        origin: PortOrigin::FrameworkConfig,
        port,
        file: path.to_path_buf(),
        confidence: Confidence::High,
    }
}

/// First literal `port: N` outside a line comment.
fn config_port(content: &str) -> Option<u16> {
    PORT_PROPERTY
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse_port(m.as_str()))
}

/// `projects.*.architect.serve.options.port` for every project.
fn angular_ports(workspace: &Value) -> Vec<u16> {
    let Some(projects) = workspace.get("projects").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut ports = Vec::new();
    for project in projects.values() {
        let port = project
            .pointer("/architect/serve/options/port")
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .filter(|port| *port > 0);
        if let Some(port) = port {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
    }
    ports
}
