//! Vlog and debug passthrough against fake daemons.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use regex::Regex;

use opsdiag_core::{VlogDestination, VlogLevel};
use opsdiag_test::{FakeDaemon, SupportHarness};

fn harness() -> SupportHarness {
    SupportHarness::builder()
        .with_daemon(FakeDaemon::builder("ops-lacpd"))
        .with_daemon(FakeDaemon::builder("ops-lldpd").with_debug("lldp"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_feature_level_reaches_daemon() {
    let harness = harness();
    assert_eq!(harness.exec("vlog feature lacp file dbg").await, "");
    assert_eq!(
        harness.daemon("ops-lacpd").unwrap().vlog_level(VlogDestination::File),
        VlogLevel::Dbg
    );

    let out = harness.exec("show vlog config feature lacp").await;
    assert!(Regex::new(r"lacp\s+INFO\s+DBG").unwrap().is_match(&out), "{out}");
}

#[tokio::test]
async fn test_daemon_level_is_probed_live() {
    let harness = harness();
    assert_eq!(harness.exec("vlog daemon ops-lldpd syslog warn").await, "");
    let out = harness.exec("show vlog config daemon ops-lldpd").await;
    assert!(Regex::new(r"ops-lldpd\s+WARN\s+INFO").unwrap().is_match(&out), "{out}");
}

#[tokio::test]
async fn test_full_table_lists_features_and_daemons() {
    let harness = harness();
    harness.exec("vlog feature lacp syslog err").await;
    let out = harness.exec("show vlog config").await;
    assert!(out.contains("Feature"));
    assert!(Regex::new(r"(?m)^lacp\s+ERR\s+INFO").unwrap().is_match(&out), "{out}");
    assert!(Regex::new(r"(?m)^\s+ops-lacpd\s+ERR\s+INFO").unwrap().is_match(&out), "{out}");
}

#[tokio::test]
async fn test_feature_list() {
    let out = harness().exec("show vlog config list").await;
    assert!(out.contains("Features"));
    assert!(out.contains("Link Aggregation Control Protocol"));
}

#[tokio::test]
async fn test_unknown_scopes() {
    let harness = harness();
    assert_eq!(
        harness.exec("vlog feature bogus syslog info").await,
        "Feature not present\n"
    );
    let name = "adsf@f$*ASDfjaklsdf@#Q@3r";
    assert_eq!(
        harness.exec(&format!("vlog daemon {name} syslog info")).await,
        format!("Not able to communicate with daemon {name}\n")
    );
    assert_eq!(
        harness.exec("show vlog config feature bogus").await,
        "Feature not present\n"
    );
}

#[tokio::test]
async fn test_strict_grammar() {
    let harness = harness();
    for line in [
        "vlog feature lacp",
        "vlog feature lacp syslog",
        "vlog feature lacp console info",
        "vlog feature lacp syslog loud",
        "vlog group lacp syslog info",
        "vlog feature lacp syslog info extra",
    ] {
        assert_eq!(harness.exec(line).await, "% Unknown command.\n", "{line}");
    }
    assert_eq!(
        harness.daemon("ops-lacpd").unwrap().vlog_level(VlogDestination::Syslog),
        VlogLevel::Info
    );
}

#[tokio::test]
async fn test_debug_passthrough() {
    let harness = harness();
    assert!(harness.exec("show debugging lldp").await.contains("lldp debugging is off"));

    assert_eq!(harness.exec("debug lldp all").await, "");
    assert_eq!(
        harness.daemon("ops-lldpd").unwrap().debug_flags("lldp"),
        vec!["all".to_string()]
    );
    assert!(harness.exec("show debugging lldp").await.contains("lldp debugging: all"));

    assert_eq!(harness.exec("no debug lldp all").await, "");
    assert!(harness.daemon("ops-lldpd").unwrap().debug_flags("lldp").is_empty());
}

#[tokio::test]
async fn test_debug_unknown_feature() {
    let out = harness().exec("debug bogus all").await;
    assert_eq!(out, "Feature not present\n");
}
