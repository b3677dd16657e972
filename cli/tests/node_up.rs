mod common;

use std::sync::Arc;

use nodeup_cli::app::{check_required, node_up, run_node_up};
use nodeup_core::api::{AppConfig, CloudProvider, ConfigError, NodeupError};
use nodeup_core::testing::{CountingCloud, MemoryHost, SharedBuffer};

use common::{output, Fixture};

fn app_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.executor.retry.base_delay_ms = 10;
    cfg.executor.retry.max_task_duration_secs = 5;
    cfg
}

#[tokio::test]
async fn dry_run_reports_and_leaves_the_host_alone() {
    let fixture = Fixture::new("");
    let host = Arc::new(MemoryHost::default());
    let report = SharedBuffer::default();

    let result = node_up(
        &fixture.args("dryrun"),
        &app_config(),
        host.clone(),
        None,
        output(report.clone()),
    )
    .await
    .unwrap();

    assert!(result.total_tasks > 0);
    assert_eq!(host.mutations(), 0);
    let report = report.contents();
    assert!(report.contains("/etc/sysctl.d/99-k8s-general.conf"));
    assert!(report.contains("/var/cache/nodeup"));
}

#[tokio::test]
async fn direct_run_converges_then_is_idempotent() {
    let fixture = Fixture::new("sysctlParameters:\n  - net.ipv4.tcp_keepalive_time = 600\n");
    let host = Arc::new(MemoryHost::default());
    let args = fixture.args("direct");

    let first = node_up(&args, &app_config(), host.clone(), None, output(std::io::sink()))
        .await
        .unwrap();
    assert!(first.applied() > 0);
    let sysctl = host.file_string("/etc/sysctl.d/99-k8s-general.conf").unwrap();
    let cluster = sysctl.find("net.ipv4.tcp_keepalive_time = 600").unwrap();
    let ig = sysctl.find("vm.swappiness = 0").unwrap();
    assert!(cluster < ig);

    let mutations = host.mutations();
    let second = node_up(&args, &app_config(), host.clone(), None, output(std::io::sink()))
        .await
        .unwrap();
    assert_eq!(second.applied(), 0);
    // Only the best-effort br_netfilter load runs again.
    assert_eq!(host.mutations(), mutations + 1);
}

#[tokio::test]
async fn cloudinit_script_has_every_step() {
    let fixture = Fixture::new("");
    let host = Arc::new(MemoryHost::default());
    let script = SharedBuffer::default();

    let result = node_up(
        &fixture.args("cloudinit"),
        &app_config(),
        host.clone(),
        None,
        output(script.clone()),
    )
    .await
    .unwrap();

    let script = script.contents();
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("# Node tags: "));
    assert_eq!(script.matches("\n# [").count(), result.total_tasks);
    assert_eq!(host.mutations(), 0);
}

#[tokio::test]
async fn missing_key_store_is_a_config_error() {
    let fixture = Fixture::new("");
    let spec = fixture.dir.path().join("state/cluster-completed.spec");
    let contents = std::fs::read_to_string(&spec).unwrap();
    let without_keystore: String = contents
        .lines()
        .filter(|l| !l.starts_with("keyStore:"))
        .map(|l| format!("{l}\n"))
        .collect();
    std::fs::write(&spec, without_keystore).unwrap();

    let err = node_up(
        &fixture.args("dryrun"),
        &app_config(),
        Arc::new(MemoryHost::default()),
        None,
        output(std::io::sink()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 11);
    assert!(err.to_string().contains("KeyStore is required"));
}

#[tokio::test]
async fn unknown_target_is_rejected() {
    let fixture = Fixture::new("");
    let err = node_up(
        &fixture.args("terraform"),
        &app_config(),
        Arc::new(MemoryHost::default()),
        None,
        output(std::io::sink()),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        NodeupError::Config(ConfigError::InvalidTarget(ref t)) if t == "terraform"
    ));
}

#[tokio::test]
async fn rejected_run_leaves_previous_output_alone() {
    let fixture = Fixture::new("");
    let out = fixture.dir.path().join("bootstrap.sh");
    std::fs::write(&out, "#!/bin/bash\necho previous\n").unwrap();

    let mut args = fixture.args("terraform");
    args.out = Some(out.clone());
    let err = run_node_up(&args, &app_config()).await.unwrap_err();
    assert_eq!(err.exit_code(), 11);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "#!/bin/bash\necho previous\n");

    let spec = fixture.dir.path().join("state/cluster-completed.spec");
    let contents = std::fs::read_to_string(&spec).unwrap();
    std::fs::write(&spec, contents.replace("keyStore:", "ignoredStore:")).unwrap();
    let mut args = fixture.args("cloudinit");
    args.out = Some(out.clone());
    let err = run_node_up(&args, &app_config()).await.unwrap_err();
    assert!(err.to_string().contains("KeyStore is required"));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "#!/bin/bash\necho previous\n");
}

#[tokio::test]
async fn kubelet_hostname_is_read_from_cloud_metadata() {
    let fixture = Fixture::new("kubelet:\n  hostnameOverride: \"@gce\"\n");
    let cloud = Arc::new(
        CountingCloud::for_provider("gce")
            .with_metadata("instance/hostname", "nodes-x1.c.project.internal"),
    );

    let result = node_up(
        &fixture.args("dryrun"),
        &app_config(),
        Arc::new(MemoryHost::default()),
        Some(cloud.clone() as Arc<dyn CloudProvider>),
        output(std::io::sink()),
    )
    .await
    .unwrap();
    assert!(result.total_tasks > 0);
    // The execution context owned the handle and closed it.
    assert_eq!(cloud.closed(), 1);

    let err = node_up(
        &fixture.args("dryrun"),
        &app_config(),
        Arc::new(MemoryHost::default()),
        None,
        output(std::io::sink()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 13);
}

#[test]
fn required_inputs_are_checked_in_order() {
    let fixture = Fixture::new("");
    let mut args = fixture.args("direct");
    args.fs_root = Default::default();
    args.conf = None;
    assert!(matches!(
        check_required(&args),
        Err(ConfigError::MissingField("FSRoot"))
    ));

    args.fs_root = fixture.dir.path().join("root");
    assert!(matches!(
        check_required(&args),
        Err(ConfigError::MissingField("ConfigLocation"))
    ));

    args.conf = Some("node.yaml".into());
    args.cache_dir = Default::default();
    assert!(matches!(
        check_required(&args),
        Err(ConfigError::MissingField("CacheDir"))
    ));
}
