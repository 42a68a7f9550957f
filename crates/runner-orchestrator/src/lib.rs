pub mod pipeline;

pub use pipeline::{stage_labels, Orchestrator};
