use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;

/// Ordered set of opaque test identifiers.
///
/// Insertion order is the order the record declared the tests in.
pub type TestSet = IndexSet<String>;

/// A bug-fix record: repository state, the patch claimed to fix it, and the
/// tests the patch is expected to flip or preserve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub instance_id: String,
    pub repo: String,
    pub base_commit: String,
    pub patch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_patch: Option<String>,
    #[serde(rename = "FAIL_TO_PASS")]
    pub fail_to_pass: TestSet,
    #[serde(rename = "PASS_TO_PASS")]
    pub pass_to_pass: TestSet,
    /// Every other field of the record (problem statement, hints, version...)
    #[serde(flatten)]
    pub metadata: IndexMap<String, Value>,
}

impl DataPoint {
    /// FAIL_TO_PASS followed by PASS_TO_PASS
    pub fn declared_tests(&self) -> TestSet {
        self.fail_to_pass
            .iter()
            .chain(self.pass_to_pass.iter())
            .cloned()
            .collect()
    }

    /// Short commit for log lines
    pub fn short_commit(&self) -> &str {
        let end = self
            .base_commit
            .char_indices()
            .nth(10)
            .map(|(i, _)| i)
            .unwrap_or(self.base_commit.len());
        &self.base_commit[..end]
    }
}

/// Rules `validate_shape` applies beyond field presence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapePolicy {
    /// Reject records whose PASS_TO_PASS set is empty
    pub require_pass_to_pass: bool,
}

impl Default for ShapePolicy {
    fn default() -> Self {
        Self {
            require_pass_to_pass: true,
        }
    }
}
