//! Remote log forwarding from the event log and the local syslog socket.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;
use tokio::net::UnixDatagram;

use opsdiag::EVENT_LOG_METHOD;
use opsdiag_core::ControlClient;
use opsdiag_test::{SupportHarness, SyslogSink};

const WAIT: Duration = Duration::from_secs(3);

async fn publish(harness: &SupportHarness, message: &str) {
    ControlClient::new(&harness.config().paths.run_dir)
        .call_ok(
            "opsdiagd",
            EVENT_LOG_METHOD,
            vec!["lldp".into(), "warn".into(), "1004".into(), message.into()],
            Duration::from_secs(2),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_show_logging_tracks_targets() {
    let harness = SupportHarness::builder().build().unwrap();
    assert_eq!(
        harness.exec("show logging").await,
        "No remote syslog server configured\n"
    );

    assert_eq!(harness.exec("logging 10.0.0.9").await, "");
    assert_eq!(harness.exec("logging 10.0.0.9").await, "");
    assert_eq!(harness.exec("logging 10.0.0.10 tcp 1514").await, "");
    let out = harness.exec("show logging").await;
    assert!(out.contains("10.0.0.9"));
    assert!(out.contains("1514"));
    assert_eq!(out.matches("10.0.0.9 ").count(), 1);

    assert_eq!(harness.exec("no logging 10.0.0.9").await, "");
    assert_eq!(harness.exec("no logging 10.0.0.10 tcp 1514").await, "");
    assert_eq!(
        harness.exec("show logging").await,
        "No remote syslog server configured\n"
    );
}

#[tokio::test]
async fn test_bad_target_arguments() {
    let harness = SupportHarness::builder().build().unwrap();
    for line in [
        "logging",
        "logging 10.0.0.9 sctp",
        "logging 10.0.0.9 udp 0",
        "logging 10.0.0.9 udp 70000",
        "logging 10.0.0.9 udp 514 extra",
    ] {
        assert_eq!(harness.exec(line).await, "% Unknown command.\n", "{line}");
    }
}

#[tokio::test]
async fn test_events_forwarded_over_udp() {
    let harness = SupportHarness::builder().build().unwrap();
    let mut sink = SyslogSink::udp().await.unwrap();
    harness
        .exec(&format!("logging 127.0.0.1 udp {}", sink.port()))
        .await;

    publish(&harness, "neighbor lost").await;
    let line = sink.expect_line("neighbor lost", WAIT).await.unwrap();
    // local7.warning = 23 * 8 + 4
    assert!(line.starts_with("<188>1 "), "{line}");
    assert!(
        line.ends_with(" switch1 ops-evt - - - 1004|lldp|WARN|neighbor lost"),
        "{line}"
    );
}

#[tokio::test]
async fn test_events_forwarded_over_tcp() {
    let harness = SupportHarness::builder().build().unwrap();
    let mut sink = SyslogSink::tcp().await.unwrap();
    harness
        .exec(&format!("logging 127.0.0.1 tcp {}", sink.port()))
        .await;

    publish(&harness, "first").await;
    publish(&harness, "second").await;
    sink.expect_line("|first", WAIT).await.unwrap();
    sink.expect_line("|second", WAIT).await.unwrap();
}

#[tokio::test]
async fn test_removed_target_stops_receiving() {
    let harness = SupportHarness::builder().build().unwrap();
    let mut sink = SyslogSink::udp().await.unwrap();
    let target = format!("127.0.0.1 udp {}", sink.port());
    harness.exec(&format!("logging {target}")).await;
    publish(&harness, "before").await;
    sink.expect_line("before", WAIT).await.unwrap();

    harness.exec(&format!("no logging {target}")).await;
    publish(&harness, "after").await;
    sink.expect_silence("after", Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_udp_and_tcp_targets_are_independent() {
    let harness = SupportHarness::builder().build().unwrap();
    let mut udp = SyslogSink::udp().await.unwrap();
    let mut tcp = SyslogSink::tcp().await.unwrap();
    let tcp_target = format!("127.0.0.1 tcp {}", tcp.port());
    harness
        .exec(&format!("logging 127.0.0.1 udp {}", udp.port()))
        .await;
    harness.exec(&format!("logging {tcp_target}")).await;

    publish(&harness, "both see this").await;
    udp.expect_line("both see this", WAIT).await.unwrap();
    tcp.expect_line("both see this", WAIT).await.unwrap();

    assert_eq!(harness.exec(&format!("no logging {tcp_target}")).await, "");
    publish(&harness, "udp only").await;
    udp.expect_line("udp only", WAIT).await.unwrap();
    tcp.expect_silence("udp only", Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_target_does_not_block_others() {
    let harness = SupportHarness::builder().build().unwrap();
    let mut live = SyslogSink::udp().await.unwrap();
    // Nothing listens on the TCP target; its session keeps reconnecting.
    harness.exec("logging 127.0.0.1 tcp 9").await;
    harness
        .exec(&format!("logging 127.0.0.1 udp {}", live.port()))
        .await;

    publish(&harness, "still flowing").await;
    live.expect_line("still flowing", WAIT).await.unwrap();
}

#[tokio::test]
async fn test_local_syslog_lines_are_forwarded() {
    let harness = SupportHarness::builder().build().unwrap();
    let mut sink = SyslogSink::udp().await.unwrap();
    harness
        .exec(&format!("logging 127.0.0.1 udp {}", sink.port()))
        .await;

    let client = UnixDatagram::unbound().unwrap();
    client
        .send_to(
            b"<30>Oct 14 09:12:01 ops-portd[811]: port 1 up",
            &harness.config().paths.syslog_socket,
        )
        .await
        .unwrap();

    let line = sink.expect_line("port 1 up", WAIT).await.unwrap();
    // daemon.info = 3 * 8 + 6
    assert!(line.starts_with("<30>1 "), "{line}");
    assert!(line.ends_with(" switch1 ops-portd - - - port 1 up"), "{line}");
}
