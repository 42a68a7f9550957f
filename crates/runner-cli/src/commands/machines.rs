use anyhow::Result;
use runner_core::Config;

pub fn run(config: &Config, json: bool) -> Result<()> {
    if json {
        // Credentials stay out of the listing.
        let machines: Vec<serde_json::Value> = config
            .machines
            .iter()
            .map(|m| {
                serde_json::json!({
                    "address": m.address,
                    "port": m.ssh_port(),
                    "username": m.username,
                    "platform": m.platform.to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&machines)?);
        return Ok(());
    }

    if config.machines.is_empty() {
        println!(
            "No machines configured. Add them to {}",
            Config::default_path().display()
        );
        return Ok(());
    }

    for machine in &config.machines {
        println!(
            "{} ({}@{}:{})",
            machine.platform, machine.username, machine.address, machine.ssh_port()
        );
    }
    Ok(())
}
