//! Crash detection, core retention and copy-out.
//!
//! # Toyota Way: Jidoka (自働化)
//! A crashed daemon must leave an event and a core behind, whichever path
//! reported it.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;
use tokio::process::Command;

use opsdiag::CORE_REPORT_METHOD;
use opsdiag_core::ControlClient;
use opsdiag_core::channel::INVALID_PARAMS;
use opsdiag_test::{SupportHarness, TftpSink};

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for_core(harness: &SupportHarness, daemon: &str) {
    harness
        .eventually(WAIT, |h| !h.shell().services().cores.list_for(daemon).is_empty())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_no_cores() {
    let harness = SupportHarness::builder().build().unwrap();
    assert_eq!(harness.exec("show core-dump").await, "No core dumps are present\n");
}

#[tokio::test]
async fn test_supervised_segfault_is_captured() {
    let harness = SupportHarness::builder().build().unwrap();
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg("sleep 30");
    let pid = harness.shell().monitor().supervise("ops-fake", cmd).unwrap();

    #[allow(clippy::cast_possible_wrap)]
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGSEGV,
    )
    .unwrap();
    wait_for_core(&harness, "ops-fake").await;

    let table = harness.exec("show core-dump").await;
    assert!(table.contains("ops-fake"));
    assert!(table.contains("Segmentation fault"));
    assert!(table.contains("Total number of core dumps : 1"));

    let events = harness.exec("show events category supportability").await;
    assert!(events.contains("ops-fake crashed due to Segmentation fault"));
    assert!(events.contains("|CRIT|"));
}

#[tokio::test]
async fn test_core_handler_report_over_control_socket() {
    let harness = SupportHarness::builder().build().unwrap();
    let spool = &harness.config().paths.core_spool_dir;
    std::fs::create_dir_all(spool).unwrap();
    let raw = spool.join("core.4242");
    std::fs::write(&raw, vec![0x5A; 8192]).unwrap();

    ControlClient::new(&harness.config().paths.run_dir)
        .call_ok(
            "opsdiagd",
            CORE_REPORT_METHOD,
            vec![
                "ops-lldpd".into(),
                "4242".into(),
                "6".into(),
                raw.display().to_string(),
            ],
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    wait_for_core(&harness, "ops-lldpd").await;

    let record = harness.shell().services().cores.list_for("ops-lldpd")[0].clone();
    assert_eq!(record.pid, Some(4242));
    assert_eq!(record.signal, Some(6));
    assert!(record.size_bytes < 8192);
    assert!(!raw.exists());
    assert!(harness.exec("show core-dump ops-lldpd").await.contains("Aborted"));
    assert_eq!(
        harness.exec("show core-dump ops-lacpd").await,
        "No core dumps are present\n"
    );
}

#[tokio::test]
async fn test_reported_core_outside_spool_survives() {
    let harness = SupportHarness::builder().build().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let foreign = elsewhere.path().join("startup-config");
    std::fs::write(&foreign, b"hostname switch\n").unwrap();
    let client = ControlClient::new(&harness.config().paths.run_dir);

    let reply = client
        .call(
            "opsdiagd",
            CORE_REPORT_METHOD,
            vec!["../../etc".into(), "77".into(), "11".into()],
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert_eq!(reply.error.unwrap().code, INVALID_PARAMS);

    client
        .call_ok(
            "opsdiagd",
            CORE_REPORT_METHOD,
            vec![
                "ops-lldpd".into(),
                "77".into(),
                "11".into(),
                foreign.display().to_string(),
            ],
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    wait_for_core(&harness, "ops-lldpd").await;

    assert_eq!(std::fs::read(&foreign).unwrap(), b"hostname switch\n");
    assert_eq!(harness.shell().services().cores.list().len(), 1);
}

#[tokio::test]
async fn test_retention_keeps_newest() {
    let harness = SupportHarness::builder()
        .configure(|c| c.core_dump.max_count = 2)
        .build()
        .unwrap();
    let reporter = harness.shell().monitor().reporter();
    for pid in [101, 102, 103] {
        reporter
            .report(opsdiag_crash::CrashReport::new("ops-lldpd", Some(pid), 11))
            .await
            .unwrap();
        let expected = pid;
        harness
            .eventually(WAIT, |h| {
                h.shell()
                    .services()
                    .cores
                    .list_for("ops-lldpd")
                    .iter()
                    .any(|r| r.pid == Some(expected))
            })
            .await
            .unwrap();
    }

    let cores = harness.shell().services().cores.list_for("ops-lldpd");
    assert_eq!(cores.len(), 2);
    assert!(cores.iter().all(|r| r.pid != Some(101)));
}

#[tokio::test]
async fn test_copy_core_dump_over_tftp() {
    let harness = SupportHarness::builder().build().unwrap();
    harness
        .shell()
        .monitor()
        .reporter()
        .report(opsdiag_crash::CrashReport::new("ops-lacpd", Some(77), 11))
        .await
        .unwrap();
    wait_for_core(&harness, "ops-lacpd").await;
    let record = harness.shell().services().cores.list_for("ops-lacpd")[0].clone();

    let sink = TftpSink::bind().await.unwrap();
    let line = format!(
        "copy core-dump ops-lacpd instance-id {} tftp {} lacp.core.gz",
        record.instance_id,
        sink.addr()
    );
    let out = harness.exec(&line).await;
    assert!(out.starts_with("status=success file=lacp.core.gz"), "{out}");

    let file = sink.wait_for("lacp.core.gz", WAIT).await.unwrap();
    assert_eq!(file.data, std::fs::read(&record.path).unwrap());
}

#[tokio::test]
async fn test_copy_unknown_instance_fails() {
    let harness = SupportHarness::builder().build().unwrap();
    let sink = TftpSink::bind().await.unwrap();
    let out = harness
        .exec(&format!(
            "copy core-dump ops-lacpd instance-id 99 tftp {}",
            sink.addr()
        ))
        .await;
    assert!(out.starts_with("status=failure reason="), "{out}");
    assert!(sink.received().is_empty());
}

#[tokio::test]
async fn test_clear_core_dump() {
    let harness = SupportHarness::builder().build().unwrap();
    harness
        .shell()
        .monitor()
        .reporter()
        .report(opsdiag_crash::CrashReport::new("ops-lldpd", Some(90), 11))
        .await
        .unwrap();
    wait_for_core(&harness, "ops-lldpd").await;
    let record = harness.shell().services().cores.list_for("ops-lldpd")[0].clone();

    assert_eq!(
        harness.exec("clear core-dump ops-lldpd instance-id abc").await,
        "% Unknown command.\n"
    );
    assert_eq!(
        harness
            .exec(&format!("clear core-dump ops-lacpd instance-id {}", record.instance_id))
            .await,
        format!("core dump {} of daemon ops-lacpd not found\n", record.instance_id)
    );
    assert_eq!(
        harness
            .exec(&format!("clear core-dump ops-lldpd instance-id {}", record.instance_id))
            .await,
        ""
    );
    assert!(!record.path.exists());
    assert_eq!(harness.exec("show core-dump").await, "No core dumps are present\n");
}

#[tokio::test]
async fn test_copy_grammar() {
    let harness = SupportHarness::builder().build().unwrap();
    for line in [
        "copy core-dump ops-lacpd",
        "copy core-dump ops-lacpd instance-id abc tftp 127.0.0.1",
        "copy core-dump ops-lacpd instance 1 tftp 127.0.0.1",
        "copy core-dump ops-lacpd instance-id 1 ftp 127.0.0.1",
    ] {
        assert_eq!(harness.exec(line).await, "% Unknown command.\n", "{line}");
    }
}
