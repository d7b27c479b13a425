//! Supervisor status normalization.
//!
//! Transitional states (`launching`, `stopping`) are reported as stopped
//! rather than as a fourth status: a process mid-restart reads as down until
//! the supervisor reports it online.

use crate::types::ProjectStatus;

/// Maps a supervisor-native status to the domain status.
///
/// `None` means the supervisor has no record under the key.
pub fn normalize(native: Option<&str>) -> ProjectStatus {
    let Some(native) = native else {
        return ProjectStatus::Stopped;
    };

    match native.trim().to_ascii_lowercase().as_str() {
        "online" => ProjectStatus::Running,
        "error" | "errored" => ProjectStatus::Error,
        "stopped" | "stopping" | "launching" => ProjectStatus::Stopped,
        other => {
            tracing::debug!(status = other, "Unrecognized supervisor status");
            ProjectStatus::Stopped
        }
    }
}

/// Whether a record in this native state still owns a running process and
/// must be stopped before it can be deleted.
pub fn is_live(native: Option<&str>) -> bool {
    matches!(
        native.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("online") | Some("launching") | Some("stopping")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_every_known_status() {
        let cases = [
            (Some("online"), ProjectStatus::Running),
            (Some("stopped"), ProjectStatus::Stopped),
            (Some("error"), ProjectStatus::Error),
            (Some("errored"), ProjectStatus::Error),
            (Some("stopping"), ProjectStatus::Stopped),
            (Some("launching"), ProjectStatus::Stopped),
            (Some("unknown"), ProjectStatus::Stopped),
            (None, ProjectStatus::Stopped),
        ];
        for (native, expected) in cases {
            assert_eq!(normalize(native), expected, "native {:?}", native);
        }
    }

    #[test]
    fn normalization_ignores_case_and_whitespace() {
        assert_eq!(normalize(Some(" Online\n")), ProjectStatus::Running);
        assert_eq!(normalize(Some("ERRORED")), ProjectStatus::Error);
        assert_eq!(normalize(Some("")), ProjectStatus::Stopped);
    }

    #[test]
    fn transitional_states_are_live_but_not_running() {
        for native in ["launching", "stopping"] {
            assert!(is_live(Some(native)));
            assert_eq!(normalize(Some(native)), ProjectStatus::Stopped);
        }
        assert!(is_live(Some("online")));
        assert!(!is_live(Some("stopped")));
        assert!(!is_live(Some("errored")));
        assert!(!is_live(None));
    }
}
