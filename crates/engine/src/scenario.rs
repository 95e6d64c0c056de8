//! Scenario runner – execute scripted flows from YAML files.

use crate::commands::{Command, CommandRegistry};
use crate::context::AppContext;
use crate::probes;
use crate::types::*;
use std::time::Duration;

/// Load a scenario from a YAML string.
pub fn load_scenario(yaml: &str) -> Result<Scenario, String> {
    serde_yaml::from_str(yaml).map_err(|e| format!("failed to parse scenario YAML: {}", e))
}

/// Whether a call changes OS state. Anything that does not parse is
/// treated as read-only; it fails before reaching a backend anyway.
fn is_mutation(call: &str, args: &serde_json::Value) -> bool {
    Command::parse(call, args.clone())
        .map(|c| c.refresh_with().is_some())
        .unwrap_or(false)
}

/// Run one call step. Read-only calls are bounded by `timeout_ms`;
/// mutations cannot be cancelled and always run to completion or failure,
/// an overrun is only logged.
async fn run_call(
    call: &str,
    args: &serde_json::Value,
    timeout_ms: u64,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> CommandResult {
    let fut = registry.execute(call, args.clone(), ctx);
    if is_mutation(call, args) {
        let r = fut.await;
        if r.timing_ms.total > timeout_ms {
            tracing::warn!(command = call, elapsed_ms = r.timing_ms.total, timeout_ms, "mutation overran its step timeout");
        }
        return r;
    }
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(r) => r,
        Err(_) => result_err(
            "call",
            call,
            &new_run_id(),
            timeout_ms,
            ErrorCode::Timeout,
            format!("{} did not complete within {}ms", call, timeout_ms),
        ),
    }
}

/// Execute a scenario and return the overall result.
pub async fn run_scenario(
    scenario: &Scenario,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> ScenarioResult {
    let mut step_results = Vec::new();
    let mut overall = Status::Pass;

    for (i, step) in scenario.steps.iter().enumerate() {
        match step {
            ScenarioStep::Call {
                call,
                args,
                expect_status,
                timeout_ms,
                refresh,
            } => {
                let r = run_call(call, args, *timeout_ms, ctx, registry).await;
                let actual_status = r.status.as_str();
                if actual_status != expect_status.as_str() {
                    tracing::warn!(
                        step = i,
                        expected = %expect_status,
                        actual = %actual_status,
                        "scenario step status mismatch"
                    );
                    overall = Status::Fail;
                }

                let follow_up = if *refresh { r.refresh.clone() } else { None };
                step_results.push(r);

                if let Some(list) = follow_up {
                    let lr = run_call(&list, &serde_json::Value::Null, *timeout_ms, ctx, registry).await;
                    if lr.status != Status::Pass {
                        tracing::warn!(step = i, command = %list, "refresh after mutation failed");
                        overall = Status::Fail;
                    }
                    step_results.push(lr);
                }
            }
            ScenarioStep::Probe { probe } => {
                let r = probes::run_probe(probe, ctx).await;
                if r.status != Status::Pass && r.status != Status::Skip {
                    overall = Status::Fail;
                }
                step_results.push(r);
            }
        }
    }

    ScenarioResult {
        name: scenario.name.clone(),
        overall_status: overall,
        step_results,
    }
}
