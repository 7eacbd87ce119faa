//! `dwd init` and `dwd validate`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, bail};
use watchdog_core::WatchdogConfig;
use watchdog_core::duration::format_duration;

pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = WatchdogConfig::scaffold().to_toml_string()?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ Generated {}", path.display());
    Ok(())
}

pub fn validate(path: &Path) -> anyhow::Result<()> {
    let config = WatchdogConfig::from_file(path)?;
    println!("✓ {} is valid", path.display());
    println!("{}", summary(&config));
    Ok(())
}

fn summary(config: &WatchdogConfig) -> String {
    let probe = &config.probe;
    let levels: BTreeSet<u32> = config.dependent_resources.iter().map(|d| d.level).collect();
    let mut out = format!(
        "probe: every {} (timeout {}), {} success / {} failures, verdict {:?}\n",
        format_duration(probe.interval),
        format_duration(probe.timeout),
        probe.success_threshold,
        probe.failure_threshold,
        probe.verdict_policy,
    );
    out.push_str(&format!(
        "scaling: check every {} up to {}, {} patch attempts, on step failure {:?}\n",
        format_duration(config.scaling.resource_check_interval),
        format_duration(config.scaling.resource_check_timeout),
        config.scaling.scale_retry_attempts,
        config.scaling.step_failure_policy,
    ));
    out.push_str(&format!(
        "dependents: {} across {} level(s)",
        config.dependent_resources.len(),
        levels.len()
    ));
    out
}
