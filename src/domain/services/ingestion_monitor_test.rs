use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use super::IngestionMonitor;
use super::MonitorState;
use crate::domain::fakes::status;
use crate::domain::fakes::FakeBackend;
use crate::domain::models::Event;
use crate::domain::models::IngestionStatus;

const INTERVAL: Duration = Duration::from_secs(1);

fn monitor_with(backend: &Arc<FakeBackend>) -> (IngestionMonitor, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let monitor = IngestionMonitor::new(backend.clone(), INTERVAL, tx);
    return (monitor, rx);
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    return events;
}

fn completions(events: &[Event]) -> Vec<String> {
    return events
        .iter()
        .filter_map(|event| {
            if let Event::IngestionCompleted(project_id) = event {
                return Some(project_id.to_string());
            }
            return None;
        })
        .collect();
}

fn progress(events: &[Event]) -> Vec<IngestionStatus> {
    return events
        .iter()
        .filter_map(|event| {
            if let Event::IngestionProgress(status) = event {
                return Some(status.clone());
            }
            return None;
        })
        .collect();
}

#[tokio::test(start_paused = true)]
async fn it_keeps_watching_while_active() {
    let backend = Arc::new(
        FakeBackend::default().with_status_labels(&["init", "starting", "processing", "Cloning"]),
    );
    let (monitor, mut rx) = monitor_with(&backend);

    assert!(monitor.attach("p1"));
    time::sleep(INTERVAL * 10).await;

    let events = drain(&mut rx);
    assert_eq!(monitor.state(), MonitorState::Watching("p1".to_string()));
    assert!(completions(&events).is_empty());
    assert!(progress(&events).len() >= 10);
}

#[tokio::test(start_paused = true)]
async fn it_completes_after_queued_and_running() {
    let backend = Arc::new(FakeBackend::default().with_statuses(vec![
        Ok(status("queued", &["Request received."])),
        Ok(status(
            "running",
            &["Request received.", "Cloning repository..."],
        )),
        Ok(status(
            "running",
            &[
                "Request received.",
                "Cloning repository...",
                "Scanning file structure...",
            ],
        )),
        Ok(status(
            "completed",
            &[
                "Request received.",
                "Cloning repository...",
                "Scanning file structure...",
                "Ingestion complete.",
            ],
        )),
    ]));
    let (monitor, mut rx) = monitor_with(&backend);

    monitor.attach("p1");
    time::sleep(INTERVAL * 10).await;

    let events = drain(&mut rx);
    assert_eq!(monitor.state(), MonitorState::Completed("p1".to_string()));
    assert_eq!(completions(&events), vec!["p1".to_string()]);
    assert_eq!(progress(&events).len(), 4);
    assert_eq!(
        monitor.status().unwrap().logs,
        vec![
            "Request received.".to_string(),
            "Cloning repository...".to_string(),
            "Scanning file structure...".to_string(),
            "Ingestion complete.".to_string(),
        ]
    );
    assert_eq!(backend.status_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn it_notifies_completion_exactly_once() {
    let backend = Arc::new(FakeBackend::default().with_status_labels(&["completed"]));
    let (monitor, mut rx) = monitor_with(&backend);

    monitor.attach("p1");
    time::sleep(INTERVAL * 10).await;
    // Terminal watches stay quiet until the next attach.
    time::sleep(INTERVAL * 10).await;

    let events = drain(&mut rx);
    assert_eq!(completions(&events), vec!["p1".to_string()]);
    assert_eq!(backend.status_calls(), 1);
    assert!(!monitor.is_watching());
}

#[tokio::test(start_paused = true)]
async fn it_stops_on_failure_and_keeps_the_error() {
    let mut failed = status("failed", &["Request received."]);
    failed.error = Some("Cleanup failed: permission denied".to_string());
    let backend = Arc::new(
        FakeBackend::default()
            .with_statuses(vec![Ok(status("processing", &[])), Ok(failed)]),
    );
    let (monitor, mut rx) = monitor_with(&backend);

    monitor.attach("p1");
    time::sleep(INTERVAL * 10).await;

    let events = drain(&mut rx);
    assert_eq!(
        monitor.state(),
        MonitorState::Failed {
            project_id: "p1".to_string(),
            error: Some("Cleanup failed: permission denied".to_string()),
        }
    );
    assert!(events.iter().any(|event| {
        return matches!(event, Event::IngestionFailed(id, Some(_)) if id == "p1");
    }));
    assert!(completions(&events).is_empty());
    assert_eq!(backend.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn it_survives_transient_poll_failures() {
    let backend = Arc::new(FakeBackend::default().with_statuses(vec![
        Err("connection refused".to_string()),
        Err("502 Bad Gateway".to_string()),
        Ok(status("processing", &[])),
        Ok(status("completed", &[])),
    ]));
    let (monitor, mut rx) = monitor_with(&backend);

    monitor.attach("p1");
    time::sleep(INTERVAL + INTERVAL / 2).await;
    assert_eq!(monitor.state(), MonitorState::Watching("p1".to_string()));

    time::sleep(INTERVAL * 10).await;
    let events = drain(&mut rx);
    assert_eq!(monitor.state(), MonitorState::Completed("p1".to_string()));
    assert_eq!(progress(&events).len(), 2);
    assert_eq!(backend.status_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn it_deduplicates_attach_for_the_same_project() {
    let backend = Arc::new(FakeBackend::default().with_status_labels(&["processing"]));
    let (monitor, _rx) = monitor_with(&backend);

    assert!(monitor.attach("p1"));
    assert!(!monitor.attach("p1"));
    time::sleep(INTERVAL * 2 + INTERVAL / 2).await;

    // One request per tick: t=0, t=1 and t=2.
    assert_eq!(backend.status_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn it_deduplicates_concurrent_attach_requests() {
    let backend = Arc::new(FakeBackend::default().with_status_labels(&["processing"]));
    let (monitor, _rx) = monitor_with(&backend);

    let user_monitor = monitor.clone();
    let watcher_monitor = monitor.clone();
    let (user, watcher) = tokio::join!(
        tokio::spawn(async move { return user_monitor.attach("p1") }),
        tokio::spawn(async move { return watcher_monitor.attach("p1") }),
    );
    assert!(user.unwrap() ^ watcher.unwrap());

    time::sleep(INTERVAL * 2 + INTERVAL / 2).await;
    assert_eq!(backend.status_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn it_switches_projects_on_reattach() {
    let backend = Arc::new(FakeBackend::default().with_status_labels(&["processing"]));
    let (monitor, _rx) = monitor_with(&backend);

    monitor.attach("p1");
    time::sleep(INTERVAL / 2).await;
    monitor.attach("p2");
    time::sleep(INTERVAL * 3 + INTERVAL / 4).await;

    let requests = backend.status_requests.lock().unwrap().clone();
    assert_eq!(requests[0], "p1");
    assert!(requests[1..].iter().all(|id| return id == "p2"));
    assert_eq!(requests.len(), 1 + 4);
    assert_eq!(monitor.state(), MonitorState::Watching("p2".to_string()));
}

#[tokio::test(start_paused = true)]
async fn it_discards_responses_for_superseded_watches() {
    let backend = Arc::new(
        FakeBackend::default()
            .with_status_labels(&["completed"])
            .with_status_delay(INTERVAL * 5),
    );
    let (monitor, mut rx) = monitor_with(&backend);

    monitor.attach("p1");
    time::sleep(INTERVAL).await;
    monitor.attach("p2");
    time::sleep(INTERVAL * 2).await;

    let events = drain(&mut rx);
    assert!(completions(&events).is_empty());
    assert_eq!(monitor.state(), MonitorState::Watching("p2".to_string()));
}

#[tokio::test(start_paused = true)]
async fn it_stops_requests_after_detach() {
    let backend = Arc::new(FakeBackend::default().with_status_labels(&["processing"]));
    let (monitor, _rx) = monitor_with(&backend);

    monitor.attach("p1");
    time::sleep(INTERVAL + INTERVAL / 2).await;
    monitor.detach();
    let calls = backend.status_calls();
    time::sleep(INTERVAL * 10).await;

    assert_eq!(calls, 2);
    assert_eq!(backend.status_calls(), calls);
    assert_eq!(monitor.state(), MonitorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn it_stops_requests_when_dropped() {
    let backend = Arc::new(FakeBackend::default().with_status_labels(&["processing"]));
    let (monitor, _rx) = monitor_with(&backend);

    monitor.attach("p1");
    time::sleep(INTERVAL + INTERVAL / 2).await;
    drop(monitor);
    time::sleep(INTERVAL * 10).await;

    assert_eq!(backend.status_calls(), 2);
}
