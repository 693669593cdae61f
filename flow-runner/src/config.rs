use anyhow::Context;
use flow_config::shared::RunnerConfig;
use flow_config::{LoadConfigError, load_config};

/// Values passed on the command line, taking precedence over every configuration source.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliOverrides {
    pub items_count: Option<u64>,
    pub worker_count: Option<u16>,
}

/// Loads, overrides and validates the runner configuration.
///
/// Without a `configuration` directory in the working directory the built-in defaults are used,
/// so the binary also runs outside of a checkout.
pub fn load_runner_config(overrides: CliOverrides) -> anyhow::Result<RunnerConfig> {
    let mut config = match load_config::<RunnerConfig>() {
        Ok(config) => config,
        Err(LoadConfigError::MissingConfigurationDirectory(_)) => RunnerConfig::default(),
        Err(err) => return Err(err).context("failed to load the runner configuration"),
    };

    apply_overrides(&mut config, overrides);
    config
        .validate()
        .context("the runner configuration is invalid")?;

    Ok(config)
}

fn apply_overrides(config: &mut RunnerConfig, overrides: CliOverrides) {
    if let Some(items_count) = overrides.items_count {
        config.pipeline.items_count = items_count;
    }
    if let Some(worker_count) = overrides.worker_count {
        config.pipeline.worker_count = worker_count;
    }
}
