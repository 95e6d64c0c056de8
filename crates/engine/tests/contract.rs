//! End-to-end command contract against the simulated backend.

use engine::config::EngineConfig;
use engine::platform::simulated::SimulatedPlatform;
use engine::{AppContext, CommandRegistry, ErrorCode, Status};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn ids(list: &Value, key: &str) -> BTreeSet<String> {
    list.as_array()
        .expect("list result")
        .iter()
        .map(|r| r[key].to_string())
        .collect()
}

#[tokio::test]
async fn list_commands_are_stable_without_mutation() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();
    let cases = [
        ("list_devices", "instance_id"),
        ("list_disks", "disk_number"),
        ("list_processes", "pid"),
        ("list_local_users", "sid"),
        ("list_local_groups", "sid"),
    ];
    for (cmd, key) in cases {
        let a = reg.invoke(cmd, json!({}), &ctx).await.unwrap();
        let b = reg.invoke(cmd, json!({}), &ctx).await.unwrap();
        assert_eq!(ids(&a, key), ids(&b, key), "{}", cmd);
    }
}

#[tokio::test]
async fn clear_recycle_bin_then_analyze_reports_zero() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();
    let before = reg.invoke("analyze_recycle_bin", json!({}), &ctx).await.unwrap();
    assert!(before.as_u64().unwrap() > 0);
    assert_eq!(reg.invoke("clear_recycle_bin", json!({}), &ctx).await.unwrap(), Value::Null);
    let after = reg.invoke("analyze_recycle_bin", json!({}), &ctx).await.unwrap();
    assert_eq!(after, json!(0));
}

#[tokio::test]
async fn device_status_follows_toggle() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();
    let id = "USB\\VID_046D&PID_C52B\\5&2";

    let status_of = |list: Value| {
        list.as_array()
            .unwrap()
            .iter()
            .find(|d| d["instance_id"] == id)
            .map(|d| d["status"].clone())
            .unwrap()
    };

    reg.invoke("disable_device", json!({ "instanceId": id }), &ctx).await.unwrap();
    let list = reg.invoke("list_devices", json!({}), &ctx).await.unwrap();
    assert_eq!(status_of(list), json!("Disabled"));

    reg.invoke("enable_device", json!({ "instance_id": id }), &ctx).await.unwrap();
    let list = reg.invoke("list_devices", json!({}), &ctx).await.unwrap();
    assert_eq!(status_of(list), json!("OK"));
}

#[tokio::test]
async fn user_lifecycle() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();
    let add = json!({ "userName": "alice", "password": "Pwd!2345" });

    reg.invoke("add_local_user", add.clone(), &ctx).await.unwrap();
    let err = reg.invoke("add_local_user", add, &ctx).await.unwrap_err();
    assert!(err.starts_with("already exists"), "{}", err);

    let users = reg.invoke("list_local_users", json!({}), &ctx).await.unwrap();
    assert!(users.as_array().unwrap().iter().any(|u| u["name"] == "alice"));

    reg.invoke("delete_local_user", json!({ "userName": "alice" }), &ctx)
        .await
        .unwrap();
    let err = reg
        .invoke("delete_local_user", json!({ "userName": "alice" }), &ctx)
        .await
        .unwrap_err();
    assert!(err.starts_with("not found"), "{}", err);
}

#[tokio::test]
async fn format_of_missing_volume_changes_nothing() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();
    let disks_before = reg.invoke("list_disks", json!({}), &ctx).await.unwrap();

    for args in [
        json!({ "driveLetter": "Z:", "fileSystem": "FAT32" }),
        json!({ "driveLetter": "Z:", "fileSystem": "FAT32", "confirm": true }),
    ] {
        let r = reg.execute("format_disk", args, &ctx).await;
        assert_eq!(r.status, Status::Error);
        let code = r.error.unwrap().code;
        assert!(
            code == ErrorCode::InvalidInput || code == ErrorCode::NotFound,
            "{:?}",
            code
        );
    }

    let disks_after = reg.invoke("list_disks", json!({}), &ctx).await.unwrap();
    assert_eq!(disks_before, disks_after);
}

#[tokio::test]
async fn terminate_distinguishes_refusal_from_error() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();

    let refused = reg.invoke("terminate_process", json!({ "pid": 4 }), &ctx).await;
    assert_eq!(refused, Ok(json!(false)));

    let missing = reg.invoke("terminate_process", json!({ "pid": 99999 }), &ctx).await;
    assert!(missing.unwrap_err().starts_with("not found"));

    let killed = reg.invoke("terminate_process", json!({ "pid": 1234 }), &ctx).await;
    assert_eq!(killed, Ok(json!(true)));
}

#[tokio::test]
async fn overlapping_volume_operations_are_single_flight() {
    let sim = SimulatedPlatform::seeded().with_op_delay(Duration::from_millis(200));
    let ctx = AppContext::simulated(EngineConfig::default(), Arc::new(sim));
    let reg = CommandRegistry::new();

    let (optimize, format) = tokio::join!(
        reg.execute("optimize_volume", json!({ "driveLetter": "E:" }), &ctx),
        reg.execute(
            "format_disk",
            json!({ "driveLetter": "e", "fileSystem": "NTFS", "confirm": true }),
            &ctx
        ),
    );

    let statuses = [optimize.status, format.status];
    assert_eq!(statuses.iter().filter(|s| **s == Status::Pass).count(), 1);
    let loser = if optimize.status == Status::Pass { format } else { optimize };
    assert_eq!(loser.error.unwrap().code, ErrorCode::Busy);

    // Lock released afterwards.
    let again = reg
        .execute("optimize_volume", json!({ "driveLetter": "E:" }), &ctx)
        .await;
    assert_eq!(again.status, Status::Pass);
}

#[tokio::test]
async fn system_volume_is_never_formatted() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();
    let r = reg
        .execute(
            "format_disk",
            json!({ "driveLetter": "C:", "fileSystem": "NTFS", "confirm": true }),
            &ctx,
        )
        .await;
    assert_eq!(r.error.unwrap().code, ErrorCode::PermissionDenied);
}

#[tokio::test]
async fn mutations_declare_their_refresh_list() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();
    let r = reg
        .execute(
            "format_disk",
            json!({ "driveLetter": "E:", "fileSystem": "exFAT", "confirm": true }),
            &ctx,
        )
        .await;
    assert_eq!(r.status, Status::Pass);
    assert_eq!(r.refresh.as_deref(), Some("list_disks"));

    let disks = reg.invoke("list_disks", json!({}), &ctx).await.unwrap();
    let e = disks
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["mount_point"] == "E:")
        .unwrap();
    assert_eq!(e["file_system"], "exFAT");
    assert_eq!(e["available_space"], e["total_space"]);
}

#[tokio::test]
async fn bad_file_system_is_rejected_before_any_os_call() {
    let ctx = AppContext::default_simulated();
    let reg = CommandRegistry::new();
    let err = reg
        .invoke(
            "format_disk",
            json!({ "driveLetter": "E:", "fileSystem": "ReFS", "confirm": true }),
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(err.starts_with("invalid input"), "{}", err);
}
