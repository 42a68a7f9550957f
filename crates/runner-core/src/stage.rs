use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a stage node or of a whole run.
///
/// Transitions within one attempt are monotonic:
/// `Pending -> Running -> {Success | Error}`. A re-run builds a fresh tree
/// instead of rewinding a terminal node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Error)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Success => write!(f, "success"),
            StageStatus::Error => write!(f, "error"),
        }
    }
}

/// Index of a stage node inside its tree's arena.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StageId(pub usize);

/// One unit of pipeline work in the hierarchical progress tree.
///
/// Parent links are stored as ids, not owning references, so the
/// child -> parent back-edges never form an ownership cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageNode {
    pub label: String,
    pub status: StageStatus,
    pub detail: Option<String>,
    pub parent: Option<StageId>,
    pub children: Vec<StageId>,
    /// Path relative to the run's local logs root, for nodes that project a
    /// retrieved artifact. Viewers resolve it against the run's directory.
    pub artifact: Option<String>,
}

/// Arena of stage nodes. Roots are the run's top-level pipeline stages,
/// in submission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTree {
    nodes: Vec<StageNode>,
    roots: Vec<StageId>,
}

impl StageTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, label: impl Into<String>) -> StageId {
        let id = StageId(self.nodes.len());
        self.nodes.push(StageNode {
            label: label.into(),
            status: StageStatus::Pending,
            detail: None,
            parent: None,
            children: Vec::new(),
            artifact: None,
        });
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: StageId, label: impl Into<String>) -> StageId {
        let id = StageId(self.nodes.len());
        self.nodes.push(StageNode {
            label: label.into(),
            status: StageStatus::Pending,
            detail: None,
            parent: Some(parent),
            children: Vec::new(),
            artifact: None,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: StageId) -> &StageNode {
        &self.nodes[id.0]
    }

    pub fn status(&self, id: StageId) -> StageStatus {
        self.nodes[id.0].status
    }

    pub fn roots(&self) -> &[StageId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Set a node's status. An `Error` propagates immediately through every
    /// ancestor up to the root, so the run-level aggregate follows without a
    /// separate pass.
    pub fn set_status(&mut self, id: StageId, status: StageStatus) {
        self.nodes[id.0].status = status;
        if status == StageStatus::Error {
            let mut cursor = self.nodes[id.0].parent;
            while let Some(parent) = cursor {
                self.nodes[parent.0].status = StageStatus::Error;
                cursor = self.nodes[parent.0].parent;
            }
        }
    }

    pub fn set_detail(&mut self, id: StageId, detail: impl Into<String>) {
        self.nodes[id.0].detail = Some(detail.into());
    }

    pub fn set_artifact(&mut self, id: StageId, path: impl Into<String>) {
        self.nodes[id.0].artifact = Some(path.into());
    }

    /// Resolve a parent stage from its children: `Success` only when every
    /// child is `Success`, `Error` as soon as any child is.
    pub fn complete(&mut self, id: StageId) {
        let resolved = self.aggregate_of(&self.nodes[id.0].children);
        // Leaves resolve to Success here; callers mark leaf errors directly.
        let status = match resolved {
            StageStatus::Pending | StageStatus::Running => StageStatus::Running,
            terminal => terminal,
        };
        self.set_status(id, status);
    }

    /// Aggregate status over the tree roots, i.e. the run-level status.
    pub fn aggregate(&self) -> StageStatus {
        self.aggregate_of(&self.roots)
    }

    fn aggregate_of(&self, ids: &[StageId]) -> StageStatus {
        if ids.is_empty() {
            return StageStatus::Success;
        }
        let mut all_success = true;
        let mut any_running = false;
        for id in ids {
            match self.nodes[id.0].status {
                StageStatus::Error => return StageStatus::Error,
                StageStatus::Success => {}
                StageStatus::Running => {
                    any_running = true;
                    all_success = false;
                }
                StageStatus::Pending => all_success = false,
            }
        }
        if all_success {
            StageStatus::Success
        } else if any_running {
            StageStatus::Running
        } else {
            StageStatus::Pending
        }
    }
}
