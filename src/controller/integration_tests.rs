//! End-to-end runs with `/bin/sh` scripts standing in for the capture tool.
//!
//! The script receives the feed's filter as `$1`, which selects its behaviour.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::configuration::{CaptureSettings, Config, FeedFilters};
use crate::controller::{CaptureOrchestrator, OrchestratorState};
use crate::data_capture::types::Feed;
use crate::dispatch::HandlerRegistry;
use crate::error_handling::types::{CaptureError, OrchestratorError};
use crate::protocol::EventKind;

const FAKE_TOOL: &str = r#"
case "$1" in
  fail)
    echo "tcpflow: eth0: You don't have permission to capture on that device" >&2
    exit 1
    ;;
  tribehouse)
    printf '\000\000\000L\033\002\032\014\001https://www.youtube.com/watch?v=dQw4w9WgXcQ\n'
    printf 'unrelated\n'
    ;;
  noisy)
    echo "tcpflow: boom" >&2
    exec sleep 30
    ;;
  musicroom)
    printf '\005\110\000\013dQw4w9WgXcQ\000\004Song\000\000\000\006Mousey\n'
    ;;
esac
echo "tcpflow: listening on lo" >&2
exec sleep 30
"#;

fn fake_config(community: &str, game: &str) -> Config {
    Config {
        capture: CaptureSettings {
            program: String::from("sh"),
            mode_flags: vec![String::from("-c"), FAKE_TOOL.to_string()],
            null_output: Some(String::from("/dev/null")),
        },
        filters: FeedFilters {
            community: community.to_string(),
            game: game.to_string(),
        },
    }
}

fn registry_with_noop() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.add(EventKind::PlayVidTribehouse.name(), |_| {});
    registry
}

#[tokio::test]
async fn empty_registry_is_a_configuration_error() {
    let config = Config {
        capture: CaptureSettings {
            program: String::from("/nonexistent/capture-tool"),
            ..CaptureSettings::default()
        },
        ..Config::default()
    };
    let mut orchestrator = CaptureOrchestrator::new(config, Arc::new(HandlerRegistry::new()));

    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NoHandlers));
    assert_eq!(orchestrator.state(), OrchestratorState::Created);
    assert!(orchestrator.sessions().is_empty());
}

#[tokio::test]
async fn spawn_failure_is_reported() {
    let config = Config {
        capture: CaptureSettings {
            program: String::from("/nonexistent/capture-tool"),
            ..CaptureSettings::default()
        },
        ..Config::default()
    };
    let mut orchestrator = CaptureOrchestrator::new(config, Arc::new(registry_with_noop()));

    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Capture(CaptureError::SpawnFailed { .. })
    ));
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
}

#[cfg(unix)]
#[tokio::test]
async fn start_twice_is_rejected() {
    let mut orchestrator =
        CaptureOrchestrator::new(fake_config("idle", "idle"), Arc::new(registry_with_noop()));
    orchestrator.start().await.expect("first start");
    assert_eq!(orchestrator.state(), OrchestratorState::Running);
    assert_eq!(orchestrator.sessions().len(), 2);

    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidState(_)));

    let report = orchestrator.shutdown().await;
    assert!(report.is_success());
}

#[cfg(unix)]
#[tokio::test]
async fn failing_feed_terminates_its_sibling() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut orchestrator =
        CaptureOrchestrator::new(fake_config("fail", "idle"), Arc::new(registry_with_noop()));

    let report = timeout(
        Duration::from_secs(10),
        orchestrator.run(std::future::pending::<()>()),
    )
    .await
    .expect("game feed was not terminated")
    .expect("orchestrator run");

    assert_eq!(report.failures().len(), 1);
    let failure = &report.failures()[0];
    assert_eq!(failure.feed, Feed::Community);
    assert!(failure.message.contains("don't have permission"));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    assert!(orchestrator.sessions().iter().all(|s| s.is_stopped()));
}

#[cfg(unix)]
#[tokio::test]
async fn shutdown_signal_stops_both_feeds() {
    let mut orchestrator =
        CaptureOrchestrator::new(fake_config("idle", "idle"), Arc::new(registry_with_noop()));

    let report = timeout(
        Duration::from_secs(10),
        orchestrator.run(tokio::time::sleep(Duration::from_millis(100))),
    )
    .await
    .expect("shutdown hung")
    .expect("orchestrator run");

    assert!(report.is_success());
    assert_eq!(report.to_string(), "");
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    assert!(orchestrator.sessions().iter().all(|s| s.is_stopped()));

    // A second shutdown is a no-op returning the same outcome.
    assert_eq!(orchestrator.shutdown().await, report);
}

#[cfg(unix)]
#[tokio::test]
async fn tribehouse_link_reaches_handler() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut registry = HandlerRegistry::new();
    registry.add(EventKind::PlayVidTribehouse.name(), move |event| {
        let _ = tx.send(event.fields().to_vec());
    });
    let mut orchestrator =
        CaptureOrchestrator::new(fake_config("tribehouse", "idle"), Arc::new(registry));

    let (report, fields) = timeout(Duration::from_secs(10), async {
        let mut fields = None;
        let report = orchestrator
            .run(async {
                fields = rx.recv().await;
            })
            .await;
        (report, fields)
    })
    .await
    .expect("no event decoded");

    assert!(report.expect("orchestrator run").is_success());
    assert_eq!(
        fields,
        Some(vec![String::from(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        )])
    );
}

#[cfg(unix)]
#[tokio::test]
async fn musicroom_event_reaches_handler() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut registry = HandlerRegistry::new();
    registry.add(EventKind::PlayVidMusicroom.name(), move |event| {
        let _ = tx.send(event.fields().to_vec());
    });
    let mut orchestrator =
        CaptureOrchestrator::new(fake_config("idle", "musicroom"), Arc::new(registry));

    let (report, fields) = timeout(Duration::from_secs(10), async {
        let mut fields = None;
        let report = orchestrator
            .run(async {
                fields = rx.recv().await;
            })
            .await;
        (report, fields)
    })
    .await
    .expect("no event decoded");

    assert!(report.expect("orchestrator run").is_success());
    assert_eq!(
        fields,
        Some(vec![
            String::from("dQw4w9WgXcQ"),
            String::from("Song"),
            String::from("Mousey"),
        ])
    );
}

#[cfg(unix)]
#[tokio::test]
async fn stderr_error_is_reported_on_shutdown() {
    let mut orchestrator =
        CaptureOrchestrator::new(fake_config("idle", "noisy"), Arc::new(registry_with_noop()));

    let report = timeout(
        Duration::from_secs(10),
        orchestrator.run(tokio::time::sleep(Duration::from_millis(300))),
    )
    .await
    .expect("shutdown hung")
    .expect("orchestrator run");

    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].feed, Feed::Game);
    assert_eq!(report.failures()[0].message, "tcpflow: boom");
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.to_string(), "game capture returned: tcpflow: boom\n");
}

#[cfg(unix)]
#[tokio::test]
async fn panicking_handler_terminates_other_feed() {
    let mut registry = HandlerRegistry::new();
    registry.add(EventKind::PlayVidTribehouse.name(), |_| {
        panic!("handler exploded");
    });
    let mut orchestrator =
        CaptureOrchestrator::new(fake_config("tribehouse", "idle"), Arc::new(registry));

    let report = timeout(
        Duration::from_secs(10),
        orchestrator.run(std::future::pending::<()>()),
    )
    .await
    .expect("game feed was not terminated")
    .expect("orchestrator run");

    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].feed, Feed::Community);
    assert!(report.failures()[0].message.contains("panicked"));
    assert_eq!(report.exit_code(), 1);
    assert!(orchestrator.sessions().iter().all(|s| s.is_stopped()));
}
