//! Wire types and validation for the external process supervisor.
//!
//! The supervisor (PM2) reports its process table as JSON. This crate owns the
//! shape of that payload so the gateway and its test doubles agree on it. The
//! supervisor remains the authority on what it accepts; clients reuse these
//! types to build valid start requests and to read its answers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Supervisor process names are kept to this length by the identity generator.
pub const MAX_PROCESS_NAME_LEN: usize = 16;
/// Upper bound on a single process-table payload we are willing to parse.
pub const MAX_LIST_OUTPUT_BYTES: usize = 8 * 1024 * 1024; // 8MB

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// One entry of the supervisor's process table, as the supervisor emits it.
///
/// Status may appear at the top level or nested in the environment block
/// depending on the command that produced it; `pm2_env` also accepts `env`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawProcess {
    pub name: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub pm_id: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "env")]
    pub pm2_env: Option<RawProcessEnv>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawProcessEnv {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pm_cwd: Option<String>,
}

/// Flattened view of a supervisor record.
///
/// `status` is the supervisor's native string and must go through the
/// normalizer before it reaches any domain type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub name: String,
    pub pid: Option<u32>,
    pub process_id: Option<u32>,
    pub status: Option<String>,
    pub cwd: Option<String>,
}

impl From<RawProcess> for ProcessRecord {
    fn from(raw: RawProcess) -> Self {
        let env = raw.pm2_env.unwrap_or_default();
        // The nested status reflects the managed process; the top-level one
        // is only present on older describe payloads.
        let status = env.status.or(raw.status).filter(|s| !s.trim().is_empty());
        Self {
            name: raw.name,
            // A stopped process is reported with pid 0.
            pid: raw.pid.filter(|pid| *pid != 0),
            process_id: raw.pm_id,
            status,
            cwd: env.pm_cwd,
        }
    }
}

/// Request to launch a managed process under a fixed name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartConfig {
    pub name: String,
    pub cwd: String,
    pub script: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl StartConfig {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_string(&self.name, "name")?;
        if self.name.len() > MAX_PROCESS_NAME_LEN {
            return Err(ErrorInfo::new(
                "invalid_name",
                format!("name must be {} characters or fewer", MAX_PROCESS_NAME_LEN),
            ));
        }
        require_string(&self.cwd, "cwd")?;
        require_string(&self.script, "script")?;
        if let Some(port) = self.env.get("PORT") {
            if port.parse::<u16>().map(|p| p == 0).unwrap_or(true) {
                return Err(ErrorInfo::new(
                    "invalid_port",
                    format!("PORT must be between 1 and 65535, got {}", port),
                ));
            }
        }
        Ok(())
    }
}

/// Result of a start command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub success: bool,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub process_id: Option<u32>,
}

/// Parses a process-table listing.
///
/// The supervisor CLI can print banners such as `[PM2] ...` ahead of the JSON
/// array, so parsing starts at the first `[` that opens an array of objects.
pub fn parse_process_list(output: &str) -> Result<Vec<ProcessRecord>, ErrorInfo> {
    if output.len() > MAX_LIST_OUTPUT_BYTES {
        return Err(ErrorInfo::new(
            "output_too_large",
            "process list exceeded maximum size",
        ));
    }

    let start = find_array_start(output)
        .ok_or_else(|| ErrorInfo::new("invalid_list", "process list did not contain a JSON array"))?;

    let raw: Vec<RawProcess> = serde_json::from_str(output[start..].trim_end()).map_err(|err| {
        ErrorInfo::new(
            "invalid_list",
            format!("process list is invalid JSON: {}", err),
        )
    })?;

    Ok(raw.into_iter().map(ProcessRecord::from).collect())
}

fn find_array_start(output: &str) -> Option<usize> {
    output.match_indices('[').map(|(idx, _)| idx).find(|idx| {
        matches!(
            output[idx + 1..].trim_start().chars().next(),
            Some('{') | Some(']')
        )
    })
}

fn require_string(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> StartConfig {
        StartConfig {
            name: "demoab12cd000000".to_string(),
            cwd: "/p/a".to_string(),
            script: "npm".to_string(),
            args: vec!["run".to_string(), "dev".to_string()],
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn parses_list_with_nested_env() {
        let output = r#"[
            {"pid": 4242, "name": "demo1", "pm_id": 3,
             "pm2_env": {"status": "online", "pm_cwd": "/p/a", "unrelated": 1}},
            {"pid": 0, "name": "demo2", "pm_id": 4,
             "pm2_env": {"status": "stopped"}}
        ]"#;

        let records = parse_process_list(output).expect("parse list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pid, Some(4242));
        assert_eq!(records[0].status.as_deref(), Some("online"));
        assert_eq!(records[0].cwd.as_deref(), Some("/p/a"));
        assert_eq!(records[1].pid, None);
        assert_eq!(records[1].process_id, Some(4));
    }

    #[test]
    fn skips_banner_before_json() {
        let output = "[PM2] Spawning PM2 daemon\n[{\"name\": \"demo\", \"pid\": 7}]";
        let records = parse_process_list(output).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, Some(7));

        let output = "warning: update available\n[]\n";
        assert!(parse_process_list(output).expect("parse").is_empty());
    }

    #[test]
    fn falls_back_to_top_level_status() {
        let output = r#"[{"name": "demo", "status": "errored", "env": {}}]"#;
        let records = parse_process_list(output).expect("parse");
        assert_eq!(records[0].status.as_deref(), Some("errored"));
    }

    #[test]
    fn rejects_output_without_array() {
        assert!(parse_process_list("daemon not running").is_err());
    }

    #[test]
    fn validates_start_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_long_name() {
        let mut config = base_config();
        config.name = "a".repeat(17);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_cwd() {
        let mut config = base_config();
        config.cwd = "  ".to_string();
        let err = config.validate().expect_err("missing cwd");
        assert_eq!(err.code, "missing_field");
    }

    #[test]
    fn rejects_bad_port_env() {
        let mut config = base_config();
        config.env.insert("PORT".to_string(), "70000".to_string());
        assert!(config.validate().is_err());
    }
}
