//! `dwd plan` — show the steps a scaling flow would take.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use watchdog_core::memory::InMemoryClient;
use watchdog_core::{ScaleDirection, WatchdogConfig};
use watchdog_scaler::{Flow, FlowCreator, ScalerOptions};

pub fn plan(
    config_path: &Path,
    namespace: &str,
    direction: ScaleDirection,
    format: &str,
) -> anyhow::Result<()> {
    let config = WatchdogConfig::from_file(config_path)?;
    let flow = build_flow(&config, namespace, direction);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(flow.steps())?),
        _ => print!("{}", render(&flow)),
    }
    Ok(())
}

/// Build the flow without ever running it; the client is never called.
fn build_flow(config: &WatchdogConfig, namespace: &str, direction: ScaleDirection) -> Flow {
    let creator = FlowCreator::new(
        Arc::new(InMemoryClient::new()),
        ScalerOptions::from_config(&config.scaling),
        config.dependent_resources.clone(),
    );
    creator.create_flow(&format!("{direction}-{namespace}"), namespace, direction)
}

fn render(flow: &Flow) -> String {
    let direction = flow.direction();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} in {} ({} step(s))",
        flow.name(),
        flow.namespace(),
        flow.steps().len()
    );
    for step in flow.steps() {
        let after = if step.dependent_task_ids.is_empty() {
            "-".to_string()
        } else {
            step.dependent_task_ids
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(out, "  {}  (after: {after})", step.task_id);
        for res in &step.resources {
            let target = match res.target_replicas(direction) {
                Some(n) => format!("{n} replica(s)"),
                None => "no target, left as is".to_string(),
            };
            let _ = write!(out, "    {} → {target}", res.reference());
            if !res.should_exist {
                out.push_str(" [optional]");
            }
            if let Some(pre) = res.precondition.as_ref().filter(|p| p.applies_to(direction)) {
                let _ = write!(out, " [waits for {} {}]", pre.resource, pre.condition);
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_down_plan_lists_levels_in_reverse() {
        let flow = build_flow(&WatchdogConfig::scaffold(), "shoot--a", ScaleDirection::ScaleDown);
        let text = render(&flow);

        let ca = text.find("scale-down:level-2:cluster-autoscaler").unwrap();
        let mcm = text.find("scale-down:level-1:machine-controller-manager").unwrap();
        let kcm = text.find("scale-down:level-0:kube-controller-manager").unwrap();
        assert!(ca < mcm && mcm < kcm);
        assert!(text.contains("Deployment/cluster-autoscaler → 0 replica(s) [optional]"));
        assert!(text.starts_with("scale-down-shoot--a in shoot--a (3 step(s))"));
    }

    #[test]
    fn first_step_has_no_dependencies() {
        let flow = build_flow(&WatchdogConfig::scaffold(), "shoot--a", ScaleDirection::ScaleUp);
        let text = render(&flow);

        assert!(text.contains("scale-up:level-0:kube-controller-manager  (after: -)"));
        assert!(text.contains(
            "scale-up:level-1:machine-controller-manager  (after: scale-up:level-0:kube-controller-manager)"
        ));
    }

    #[test]
    fn json_output_serializes_steps() {
        let flow = build_flow(&WatchdogConfig::scaffold(), "shoot--a", ScaleDirection::ScaleUp);
        let json = serde_json::to_value(flow.steps()).unwrap();

        assert_eq!(json.as_array().unwrap().len(), 3);
        assert_eq!(json[0]["task_id"], "scale-up:level-0:kube-controller-manager");
        assert_eq!(json[1]["level"], 1);
    }
}
