//! Task specification.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TaskId;

/// One unit of work in a batch.
///
/// Immutable once built: every field is fixed at submission time, including
/// whether the task will report a domain failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique (within a batch) task identifier.
    id: TaskId,

    /// How long the simulated work takes.
    #[serde(rename = "nominal_duration_ms", with = "duration_ms")]
    nominal_duration: Duration,

    /// Whether the task reports a domain failure when its work finishes.
    #[serde(default)]
    failure_injected: bool,
}

impl TaskSpec {
    /// Create a new TaskSpec that succeeds after `nominal_duration`.
    pub fn new(id: impl Into<TaskId>, nominal_duration: Duration) -> Self {
        Self {
            id: id.into(),
            nominal_duration,
            failure_injected: false,
        }
    }

    /// Builder method to decide the failure flag up front.
    pub fn with_failure(mut self, failure_injected: bool) -> Self {
        self.failure_injected = failure_injected;
        self
    }

    /// Builder shorthand for `with_failure(true)`.
    pub fn failing(self) -> Self {
        self.with_failure(true)
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn nominal_duration(&self) -> Duration {
        self.nominal_duration
    }

    pub fn failure_injected(&self) -> bool {
        self.failure_injected
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
