use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use super::ProjectStore;
use crate::domain::fakes::project;
use crate::domain::fakes::FakeProjects;
use crate::domain::models::Project;

#[tokio::test]
async fn it_caches_the_users_project() {
    let projects = Arc::new(FakeProjects::new(vec![Ok(Some(project("p1")))]));
    let store = ProjectStore::new(projects.clone(), "user-1");

    assert_eq!(store.current(), None);
    assert!(store.refresh().await);
    assert_eq!(store.current(), Some(project("p1")));
}

#[tokio::test]
async fn it_treats_fetch_failures_as_no_project() {
    let projects = Arc::new(FakeProjects::new(vec![Err("relation does not exist".to_string())]));
    let store = ProjectStore::new(projects.clone(), "user-1");

    assert_eq!(store.fetch_project_for("user-1").await, None);
    assert_eq!(projects.calls(), 1);
}

#[tokio::test]
async fn it_keeps_the_cache_when_a_refresh_fails() {
    let projects = Arc::new(FakeProjects::new(vec![
        Ok(Some(project("p1"))),
        Err("timeout".to_string()),
    ]));
    let store = ProjectStore::new(projects.clone(), "user-1");

    store.refresh().await;
    store.refresh().await;

    assert_eq!(store.current(), Some(project("p1")));
    assert_eq!(projects.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn it_coalesces_overlapping_refreshes() {
    let projects = Arc::new(
        FakeProjects::new(vec![Ok(Some(project("p1")))]).with_delay(Duration::from_secs(2)),
    );
    let store = ProjectStore::new(projects.clone(), "user-1");

    let (first, second, third) = tokio::join!(store.refresh(), store.refresh(), store.refresh());

    assert!(first);
    assert!(!second);
    assert!(!third);
    assert_eq!(projects.calls(), 1);

    // Once settled a new refresh goes through again.
    assert!(store.refresh().await);
    assert_eq!(projects.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn it_follows_an_in_flight_refresh_with_a_fresh_one() {
    let synced = Project {
        last_commit_hash: Some("c0ffee1d2e3f".to_string()),
        ..project("p1")
    };
    let projects = Arc::new(
        FakeProjects::new(vec![Ok(Some(project("p1"))), Ok(Some(synced.clone()))])
            .with_delay(Duration::from_secs(3)),
    );
    let store = ProjectStore::new(projects.clone(), "user-1");

    let (refreshed, _) = tokio::join!(store.refresh(), async {
        time::sleep(Duration::from_secs(1)).await;
        store.refresh_after_current().await;
    });

    assert!(refreshed);
    assert_eq!(projects.calls(), 2);
    assert_eq!(store.current(), Some(synced));
}

#[tokio::test(start_paused = true)]
async fn it_releases_the_refresh_slot_when_cancelled() {
    let projects = Arc::new(
        FakeProjects::new(vec![Ok(Some(project("p1")))]).with_delay(Duration::from_secs(5)),
    );
    let store = ProjectStore::new(projects.clone(), "user-1");

    let res = time::timeout(Duration::from_secs(1), store.refresh()).await;
    assert!(res.is_err());

    assert!(store.refresh().await);
    assert_eq!(projects.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn it_refreshes_on_an_interval() {
    let projects = Arc::new(FakeProjects::new(vec![Ok(Some(project("p1")))]));
    let store = ProjectStore::new(projects.clone(), "user-1");

    let subscription = store.start_auto_refresh(Duration::from_secs(12));
    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.current(), None);
    assert_eq!(projects.calls(), 0);

    time::sleep(Duration::from_secs(12)).await;
    assert_eq!(store.current(), Some(project("p1")));

    subscription.cancel();
    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(projects.calls(), 1);
}
