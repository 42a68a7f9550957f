pub mod machines;
pub mod run;

use runner_core::Config;
use std::path::Path;

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load_default(),
    }
}
