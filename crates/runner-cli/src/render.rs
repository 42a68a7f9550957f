use runner_core::run::Run;
use runner_core::stage::{StageId, StageStatus, StageTree};
use std::fmt::Write;

fn status_icon(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => " ",
        StageStatus::Running => ">",
        StageStatus::Success => "+",
        StageStatus::Error => "x",
    }
}

/// Plain-text projection of a run's stage tree.
pub fn render_run(run: &Run) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {} on {}", run.status, run.id, run.machine);
    for root in run.tree.roots() {
        render_node(&run.tree, *root, 1, &mut out);
    }
    out
}

fn render_node(tree: &StageTree, id: StageId, depth: usize, out: &mut String) {
    let node = tree.node(id);
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{}[{}] {}", indent, status_icon(node.status), node.label);
    if let Some(detail) = &node.detail {
        let _ = write!(out, " ({})", detail);
    }
    let _ = writeln!(out);
    for child in &node.children {
        render_node(tree, *child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_core::notify::ChangeNotifier;
    use runner_core::run::{RunHandle, RunRequest};

    #[test]
    fn renders_nested_stages_with_details() {
        let request = RunRequest {
            machine: "bench-01.lab".to_string(),
            port: None,
            package: "agent.tar.gz".into(),
            profile: String::new(),
            platform: "linux-x64".parse().unwrap(),
        };
        let run = Run::new(request, std::path::Path::new("/tmp/vcsched-tests"));
        let handle = RunHandle::new(run, ChangeNotifier::new());

        let (setup, connect) = handle.build_stages(|tree| {
            let setup = tree.add_root("Setup Machine");
            let connect = tree.add_child(setup, "Connect");
            (setup, connect)
        });
        handle.set_status(setup, StageStatus::Running);
        handle.fail(connect, "connection refused");

        let rendered = handle.with(render_run);
        assert!(rendered.contains("[x] Setup Machine"));
        assert!(rendered.contains("    [x] Connect (connection refused)"));
    }
}
