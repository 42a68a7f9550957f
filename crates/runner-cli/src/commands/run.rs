use crate::render;
use anyhow::{anyhow, Result};
use runner_core::artifacts;
use runner_core::notify::ChangeNotifier;
use runner_core::registry::RunRegistry;
use runner_core::run::RunRequest;
use runner_core::stage::StageStatus;
use runner_core::Config;
use runner_orchestrator::Orchestrator;
use runner_ssh::SshSessionFactory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(
    config: &Config,
    machine: &str,
    package: PathBuf,
    profile: String,
    remove: bool,
) -> Result<()> {
    let entry = config
        .find_machine(machine)
        .ok_or_else(|| anyhow!("machine '{}' is not configured", machine))?;
    if !package.exists() {
        return Err(anyhow!("package not found: {}", package.display()));
    }

    let notifier = ChangeNotifier::new();
    let registry = RunRegistry::new(notifier.clone());
    let artifacts_root = config
        .defaults
        .artifacts_dir
        .clone()
        .unwrap_or_else(artifacts::artifacts_root);

    let orchestrator = Orchestrator::new(
        Arc::new(SshSessionFactory::new(config.defaults.chunk_size)),
        Arc::new(config.clone()),
        registry.clone(),
        Duration::from_secs(config.defaults.connect_timeout_secs),
        artifacts_root,
    );

    let request = RunRequest {
        machine: entry.address.clone(),
        port: entry.port,
        package,
        profile,
        platform: entry.platform,
    };
    let (handle, mut join) = orchestrator.spawn_run(request);
    println!("Run {} started on {} (Ctrl-C cancels)\n", handle.id(), machine);

    let mut events = notifier.subscribe();
    loop {
        tokio::select! {
            _ = &mut join => break,
            event = events.recv() => {
                if event.is_ok() {
                    println!("{}", handle.with(render::render_run));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Cancelling run {}...", handle.id());
                handle.cancel();
            }
        }
    }

    let status = handle.with(|r| r.status);
    println!("{}", handle.with(render::render_run));
    if let Some(local_dir) = handle.with(|r| {
        if r.local_dir.exists() {
            Some(r.local_dir.clone())
        } else {
            None
        }
    }) {
        println!("Artifacts: {}", local_dir.display());
    }

    if remove {
        let deletion = registry.remove(&handle.id())?;
        deletion.await.ok();
        println!("Run removed and local artifacts deleted.");
    }

    if status == StageStatus::Success {
        Ok(())
    } else {
        Err(anyhow!("run finished with status '{}'", status))
    }
}
