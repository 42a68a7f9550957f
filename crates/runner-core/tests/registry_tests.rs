use runner_core::notify::ChangeNotifier;
use runner_core::registry::RunRegistry;
use runner_core::run::{Run, RunRequest};

fn sample_run(machine: &str, artifacts_root: &std::path::Path) -> Run {
    let request = RunRequest {
        machine: machine.to_string(),
        port: None,
        package: "agent.tar.gz".into(),
        profile: "--profile PERF-CPU".to_string(),
        platform: "linux-x64".parse().unwrap(),
    };
    Run::new(request, artifacts_root)
}

#[tokio::test]
async fn add_get_and_list_by_machine() {
    let registry = RunRegistry::new(ChangeNotifier::new());
    let scratch = tempfile::tempdir().unwrap();

    let a = registry.add(sample_run("bench-01.lab", scratch.path()));
    let _b = registry.add(sample_run("bench-02.lab", scratch.path()));

    assert_eq!(registry.list().len(), 2);
    let for_machine = registry.list_for_machine("bench-01.lab");
    assert_eq!(for_machine.len(), 1);
    assert_eq!(for_machine[0].id(), a.id());

    assert!(registry.get(&a.id()).is_ok());
}

#[tokio::test]
async fn remove_drops_run_and_deletes_artifacts() {
    let notifier = ChangeNotifier::new();
    let mut events = notifier.subscribe();
    let registry = RunRegistry::new(notifier);
    let scratch = tempfile::tempdir().unwrap();

    let handle = registry.add(sample_run("bench-01.lab", scratch.path()));
    let local_dir = handle.with(|r| r.local_dir.clone());
    std::fs::create_dir_all(local_dir.join("logs")).unwrap();
    std::fs::write(local_dir.join("logs").join("agent.log"), b"log line").unwrap();
    events.try_recv().unwrap(); // consume the add event

    let deletion = registry.remove(&handle.id()).unwrap();

    assert!(registry.get(&handle.id()).is_err());
    assert!(registry.list_for_machine("bench-01.lab").is_empty());
    events.try_recv().expect("removal fires a change event");

    deletion.await.unwrap();
    assert!(!local_dir.exists());
}

#[tokio::test]
async fn remove_unknown_run_is_an_error() {
    let registry = RunRegistry::new(ChangeNotifier::new());
    let missing = runner_core::run::RunId::new();
    assert!(registry.remove(&missing).is_err());
}
