use std::process::{Command, Output};

const ENV_VARS: &[&str] = &[
    "CONTROLPLANE_NAME",
    "CONTROLPLANE_REGION",
    "CONTROLPLANE_ADVERTISE_IP",
    "CONTROLPLANE_PEER_IP",
    "CONTROLPLANE_DATA_DIR",
    "CONTROLPLANE_ETCD_BINARY",
];

fn controlplane(args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_controlplane"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.args(args).output().expect("failed to run controlplane")
}

#[test]
fn init_without_flags_fails() {
    let out = controlplane(&["init"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("--name"));
}

#[test]
fn init_missing_advertise_fails() {
    let out = controlplane(&["init", "--name", "east1", "--region", "us-east"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--advertise-ip"));
}

#[test]
fn join_without_peer_fails() {
    let out = controlplane(&["join", "--advertise-ip", "10.0.0.2"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--peer-ip"));
}

#[test]
fn empty_region_is_rejected_before_startup() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("etcd");
    let out = controlplane(&[
        "init",
        "--name",
        "east1",
        "--region",
        "",
        "--advertise-ip",
        "10.0.0.1",
        "--no-status",
        "--data-dir",
        data_dir.to_str().unwrap(),
    ]);

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("region is required"));
    assert!(!data_dir.exists());
}

#[test]
fn missing_subcommand_fails() {
    let out = controlplane(&[]);
    assert!(!out.status.success());
}
