//! Instance lifecycle status and state machine.
//!
//! Defines the possible states of an instance and valid transitions between them.

use labbox_shared::errors::LabboxError;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an instance.
///
/// State machine:
/// ```text
/// run()          → Creating       (record persisted, workload created)
/// boot complete  → Running        (port published, route/lease registered)
/// destroy()      → Deleting       (teardown in flight, record removed on success)
///
/// Creating → CreateFailure        (start or port discovery failed)
/// Deleting → DeleteFailure        (workload removal failed)
/// ```
///
/// Both failure states are terminal but retryable: a further destroy moves
/// them back to `Deleting`. A failed create is never retried automatically.
/// `Deleting` does not re-enter itself; only one teardown runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    /// Workload created, boot in progress.
    Creating,

    /// Workload published a port and is reachable.
    Running,

    /// Workload start or port discovery failed. See the instance message.
    CreateFailure,

    /// Teardown in progress.
    Deleting,

    /// Workload removal failed. See the instance message.
    DeleteFailure,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 5] = [
        InstanceStatus::Creating,
        InstanceStatus::Running,
        InstanceStatus::CreateFailure,
        InstanceStatus::Deleting,
        InstanceStatus::DeleteFailure,
    ];

    /// Check if this status is one of the two failure states.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            InstanceStatus::CreateFailure | InstanceStatus::DeleteFailure
        )
    }

    /// Check if the instance still owns (or may still own) a workload that
    /// the boot sequence should track.
    pub fn needs_boot(&self) -> bool {
        matches!(self, InstanceStatus::Creating | InstanceStatus::Running)
    }

    /// Check if destroy() may move the instance into `Deleting`.
    ///
    /// False only while a teardown is already in flight.
    pub fn can_destroy(&self) -> bool {
        self.can_transition_to(InstanceStatus::Deleting)
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, target),
            // Boot finished, or recovery re-confirming a running workload
            (Creating, Running) |
            (Running, Running) |
            // Boot failed (also reached when recovery cannot restart a workload)
            (Creating, CreateFailure) |
            (Running, CreateFailure) |
            // Teardown can begin from anywhere but itself
            (Creating | Running | CreateFailure | DeleteFailure, Deleting) |
            (Deleting, DeleteFailure)
        )
    }

    /// Statuses from which `target` is reachable.
    ///
    /// Used to build conditional updates so a transition is applied
    /// atomically against the persisted status.
    pub fn predecessors(target: InstanceStatus) -> Vec<InstanceStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(target))
            .collect()
    }

    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Creating => "creating",
            InstanceStatus::Running => "running",
            InstanceStatus::CreateFailure => "create-failure",
            InstanceStatus::Deleting => "deleting",
            InstanceStatus::DeleteFailure => "delete-failure",
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = LabboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(InstanceStatus::Creating),
            "running" => Ok(InstanceStatus::Running),
            "create-failure" => Ok(InstanceStatus::CreateFailure),
            "deleting" => Ok(InstanceStatus::Deleting),
            "delete-failure" => Ok(InstanceStatus::DeleteFailure),
            other => Err(LabboxError::Storage(format!(
                "unknown instance status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        // Creating transitions
        assert!(InstanceStatus::Creating.can_transition_to(InstanceStatus::Running));
        assert!(InstanceStatus::Creating.can_transition_to(InstanceStatus::CreateFailure));
        assert!(InstanceStatus::Creating.can_transition_to(InstanceStatus::Deleting));
        assert!(!InstanceStatus::Creating.can_transition_to(InstanceStatus::DeleteFailure));

        // Running transitions
        assert!(InstanceStatus::Running.can_transition_to(InstanceStatus::Deleting));
        assert!(InstanceStatus::Running.can_transition_to(InstanceStatus::Running));
        assert!(!InstanceStatus::Running.can_transition_to(InstanceStatus::Creating));

        // Deleting transitions
        assert!(InstanceStatus::Deleting.can_transition_to(InstanceStatus::DeleteFailure));
        assert!(!InstanceStatus::Deleting.can_transition_to(InstanceStatus::Deleting));
        assert!(!InstanceStatus::Deleting.can_transition_to(InstanceStatus::Running));

        // Failures are terminal except for a retried destroy
        assert!(InstanceStatus::CreateFailure.can_transition_to(InstanceStatus::Deleting));
        assert!(!InstanceStatus::CreateFailure.can_transition_to(InstanceStatus::Running));
        assert!(InstanceStatus::DeleteFailure.can_transition_to(InstanceStatus::Deleting));
        assert!(!InstanceStatus::DeleteFailure.can_transition_to(InstanceStatus::Running));
    }

    #[test]
    fn test_nothing_returns_to_creating() {
        for status in InstanceStatus::ALL {
            assert!(!status.can_transition_to(InstanceStatus::Creating));
        }
    }

    #[test]
    fn test_destroy_accepted_unless_deleting() {
        for status in InstanceStatus::ALL {
            assert_eq!(
                status.can_destroy(),
                status != InstanceStatus::Deleting,
                "{status}"
            );
        }
    }

    #[test]
    fn test_status_groups() {
        assert!(InstanceStatus::Creating.needs_boot());
        assert!(InstanceStatus::Running.needs_boot());
        assert!(!InstanceStatus::Deleting.needs_boot());
        assert!(InstanceStatus::CreateFailure.is_failure());
        assert!(InstanceStatus::DeleteFailure.is_failure());
        assert!(!InstanceStatus::Running.is_failure());
    }

    #[test]
    fn test_predecessors() {
        let running = InstanceStatus::predecessors(InstanceStatus::Running);
        assert_eq!(
            running,
            vec![InstanceStatus::Creating, InstanceStatus::Running]
        );

        let delete_failure = InstanceStatus::predecessors(InstanceStatus::DeleteFailure);
        assert_eq!(delete_failure, vec![InstanceStatus::Deleting]);

        let deleting = InstanceStatus::predecessors(InstanceStatus::Deleting);
        assert_eq!(deleting.len(), InstanceStatus::ALL.len() - 1);
        assert!(!deleting.contains(&InstanceStatus::Deleting));
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(InstanceStatus::Creating.as_str(), "creating");
        assert_eq!(InstanceStatus::Running.as_str(), "running");
        assert_eq!(InstanceStatus::CreateFailure.as_str(), "create-failure");
        assert_eq!(InstanceStatus::Deleting.as_str(), "deleting");
        assert_eq!(InstanceStatus::DeleteFailure.as_str(), "delete-failure");
    }

    #[test]
    fn test_status_from_str() {
        for status in InstanceStatus::ALL {
            assert_eq!(status.as_str().parse::<InstanceStatus>().unwrap(), status);
        }
        assert!("stopped".parse::<InstanceStatus>().is_err());
    }

    #[test]
    fn test_serde_matches_storage_form() {
        let json = serde_json::to_string(&InstanceStatus::CreateFailure).unwrap();
        assert_eq!(json, "\"create-failure\"");
    }
}
