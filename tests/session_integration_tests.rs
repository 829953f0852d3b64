//! Integration tests for SessionManager with background lookups and scans
//!
//! These tests verify that the SessionManager correctly:
//! - Emits change events for edits
//! - Applies workshop names and scan results for the current session
//! - Discards results for closed or reopened sessions
//! - Cancels superseded scans
//! - Downgrades lookup and scan failures to events

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use mockall::mock;
use pzmm::services::{ListChange, LookupError, LookupResult, WorkshopLookup};
use pzmm::{SessionChange, SessionManager};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

mock! {
    pub Lookup {}

    #[async_trait]
    impl WorkshopLookup for Lookup {
        async fn fetch_names(&self, workshop_ids: &[String]) -> Result<LookupResult, LookupError>;
    }
}

struct Fixture {
    _temp: TempDir,
    root: Utf8PathBuf,
    path: Utf8PathBuf,
}

impl Fixture {
    fn new(contents: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let path = root.join("servertest.ini");
        fs::write(&path, contents).unwrap();
        Self {
            _temp: temp,
            root,
            path,
        }
    }

    /// Workshop tree under `<root>/workshop/content/108600`.
    fn workshop(&self, items: &[(&str, &str, &str)]) -> Utf8PathBuf {
        let workshop = self.root.join("workshop");
        for (workshop_id, mod_id, name) in items {
            let mod_dir = workshop
                .join("content/108600")
                .join(workshop_id)
                .join("mods")
                .join(mod_id);
            fs::create_dir_all(&mod_dir).unwrap();
            fs::write(mod_dir.join("mod.info"), format!("name={}\nid={}\n", name, mod_id)).unwrap();
        }
        workshop
    }
}

fn open(path: &Utf8Path) -> SessionManager {
    let manager = SessionManager::new();
    manager.open(path).unwrap();
    manager
}

async fn next_event(rx: &mut broadcast::Receiver<SessionChange>) -> SessionChange {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed")
}

fn drain(rx: &mut broadcast::Receiver<SessionChange>) -> Vec<SessionChange> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_edit_events_emitted() {
    let fixture = Fixture::new("Mods=\\A;\\B\nWorkshopItems=1;2\n");
    let manager = open(&fixture.path);
    let mut rx = manager.subscribe();

    manager.move_entry(1, 0).unwrap();
    manager.set_enabled(0, false).unwrap();
    let removed = manager.remove_entry(1).unwrap();

    assert_eq!(
        next_event(&mut rx).await,
        SessionChange::List(ListChange::Moved { from: 1, to: 0 })
    );
    assert_eq!(
        next_event(&mut rx).await,
        SessionChange::List(ListChange::Updated { order: 0 })
    );
    assert_eq!(
        next_event(&mut rx).await,
        SessionChange::List(ListChange::Removed {
            order: 1,
            entry: removed,
        })
    );
}

#[tokio::test]
async fn test_name_lookup_applies_names() {
    let fixture = Fixture::new("Mods=\\A;\\B;\\C\nWorkshopItems=1;2;1\n");
    let manager = open(&fixture.path);
    let mut rx = manager.subscribe();

    let mut lookup = MockLookup::new();
    lookup
        .expect_fetch_names()
        .withf(|ids| ids.to_vec() == vec!["1", "2"])
        .times(1)
        .returning(|_| Ok([("1", "Mod One")].into_iter().collect()));

    let task = manager
        .spawn_name_lookup(&Handle::current(), Arc::new(lookup))
        .expect("Unresolved ids should start a lookup");
    task.await.unwrap();

    let entries = manager.entries().unwrap();
    assert_eq!(entries[0].display_name.as_deref(), Some("Mod One"));
    assert_eq!(entries[1].display_name, None);
    assert_eq!(entries[2].display_name.as_deref(), Some("Mod One"));

    let events = drain(&mut rx);
    assert!(events.contains(&SessionChange::NamesResolved { applied: 2 }));
    // Names are not part of the configuration file
    assert!(!manager.is_dirty());
}

#[tokio::test]
async fn test_lookup_skipped_when_nothing_unresolved() {
    let fixture = Fixture::new("Mods=\\A\n");
    let manager = open(&fixture.path);

    let mut lookup = MockLookup::new();
    lookup.expect_fetch_names().never();

    assert!(
        manager
            .spawn_name_lookup(&Handle::current(), Arc::new(lookup))
            .is_none()
    );
}

#[tokio::test]
async fn test_lookup_failure_emits_event() {
    let fixture = Fixture::new("WorkshopItems=1\n");
    let manager = open(&fixture.path);
    let mut rx = manager.subscribe();

    let mut lookup = MockLookup::new();
    lookup
        .expect_fetch_names()
        .returning(|_| Err(LookupError::RateLimited));

    manager
        .spawn_name_lookup(&Handle::current(), Arc::new(lookup))
        .unwrap()
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut rx).await,
        SessionChange::LookupFailed { .. }
    ));
    assert_eq!(manager.entries().unwrap()[0].display_name, None);
}

#[tokio::test]
async fn test_lookup_discarded_after_close() {
    let fixture = Fixture::new("WorkshopItems=1\n");
    let manager = open(&fixture.path);

    let mut lookup = MockLookup::new();
    lookup
        .expect_fetch_names()
        .returning(|_| Ok([("1", "Mod One")].into_iter().collect()));

    // The current-thread runtime does not run the task until it is awaited
    let task = manager
        .spawn_name_lookup(&Handle::current(), Arc::new(lookup))
        .unwrap();
    manager.open(&fixture.path).unwrap();
    let mut rx = manager.subscribe();
    task.await.unwrap();

    assert!(drain(&mut rx).is_empty());
    assert_eq!(manager.entries().unwrap()[0].display_name, None);
}

#[tokio::test]
async fn test_scan_fills_missing_ids() {
    let fixture = Fixture::new("Mods=\\ModB\nWorkshopItems=222;111\n");
    let workshop = fixture.workshop(&[("111", "ModA", "Mod A"), ("222", "ModB", "Mod B")]);
    let manager = open(&fixture.path);
    let mut rx = manager.subscribe();

    // Pairs by index: (ModB, 222) and ("", 111)
    manager
        .spawn_scan(&Handle::current(), workshop)
        .unwrap()
        .await
        .unwrap();

    let entries = manager.entries().unwrap();
    assert_eq!(entries[0].display_name.as_deref(), Some("Mod B"));
    assert_eq!(entries[1].mod_id, "ModA");
    assert_eq!(entries[1].workshop_id.as_deref(), Some("111"));
    assert_eq!(entries[1].display_name.as_deref(), Some("Mod A"));

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionChange::ScanApplied {
            mod_ids_filled: 1,
            ..
        }
    )));
    assert!(manager.is_dirty());

    manager.save().unwrap();
    assert_eq!(
        fs::read_to_string(&fixture.path).unwrap(),
        "Mods=\\ModB;\\ModA\nWorkshopItems=222;111\n"
    );
}

#[tokio::test]
async fn test_scan_leaves_mods_line_without_repeats() {
    let fixture = Fixture::new("Mods=\\ModB\nWorkshopItems=111;222\n");
    let workshop = fixture.workshop(&[("111", "ModA", "Mod A"), ("222", "ModB", "Mod B")]);
    let manager = open(&fixture.path);

    // ("", 222) would become a second ModB entry
    manager
        .spawn_scan(&Handle::current(), workshop)
        .unwrap()
        .await
        .unwrap();

    assert!(manager.entries().unwrap()[1].mod_id.is_empty());
    assert!(!manager.is_dirty());

    manager.save().unwrap();
    let contents = fs::read_to_string(&fixture.path).unwrap();
    assert_eq!(contents, "Mods=\\ModB\nWorkshopItems=111;222\n");
}

#[tokio::test]
async fn test_new_scan_cancels_previous() {
    let fixture = Fixture::new("WorkshopItems=111\n");
    let workshop = fixture.workshop(&[("111", "ModA", "Mod A")]);
    let manager = open(&fixture.path);
    let mut rx = manager.subscribe();

    let first = manager
        .spawn_scan(&Handle::current(), workshop.clone())
        .unwrap();
    let second = manager.spawn_scan(&Handle::current(), workshop).unwrap();
    first.await.unwrap();
    second.await.unwrap();

    let applied = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SessionChange::ScanApplied { .. }))
        .count();
    assert_eq!(applied, 1);
    assert_eq!(manager.entries().unwrap()[0].mod_id, "ModA");
}

#[tokio::test]
async fn test_scan_discarded_after_reopen() {
    let fixture = Fixture::new("WorkshopItems=111\n");
    let workshop = fixture.workshop(&[("111", "ModA", "Mod A")]);
    let manager = open(&fixture.path);

    let task = manager.spawn_scan(&Handle::current(), workshop).unwrap();
    manager.open(&fixture.path).unwrap();
    let mut rx = manager.subscribe();
    task.await.unwrap();

    assert!(drain(&mut rx).is_empty());
    assert!(manager.entries().unwrap()[0].mod_id.is_empty());
    assert!(!manager.is_dirty());
}

#[tokio::test]
async fn test_scan_of_missing_directory_fails_soft() {
    let fixture = Fixture::new("WorkshopItems=111\n");
    let manager = open(&fixture.path);
    let mut rx = manager.subscribe();

    manager
        .spawn_scan(&Handle::current(), fixture.root.join("no-such-dir"))
        .unwrap()
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut rx).await,
        SessionChange::ScanFailed { .. }
    ));
    assert_eq!(manager.entries().unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_background_work_without_session() {
    let manager = SessionManager::new();
    let lookup = MockLookup::new();

    assert!(
        manager
            .spawn_name_lookup(&Handle::current(), Arc::new(lookup))
            .is_none()
    );
    assert!(
        manager
            .spawn_scan(&Handle::current(), Utf8PathBuf::from("/tmp"))
            .is_none()
    );
}

#[test]
fn test_concurrent_edits_from_threads() {
    let fixture = Fixture::new("Mods=\\A\nWorkshopItems=1\n");
    let manager = open(&fixture.path);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.add_entry(&(100 + i).to_string(), Some(0)))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let entries = manager.entries().unwrap();
    assert_eq!(entries.len(), 9);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.order, i);
    }
}
