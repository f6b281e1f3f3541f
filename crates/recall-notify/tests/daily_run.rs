/// Daily run behaviour against a real (in-memory) store and a scripted
/// transport: rotation, multi-device fan-out, pruning of dead endpoints and
/// per-user failure isolation, panics included.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use uuid::Uuid;

use recall_db::Database;
use recall_db::models::{NewSubscription, NoteRow, SubscriptionRow, UserRow};
use recall_notify::{DailyNotifier, DeliveryOutcome, NotificationStore, PushTransport};
use recall_types::push::NotificationPayload;

/// Day 100 of a non-leap year.
fn day_100() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 10).unwrap()
}

#[derive(Default)]
struct ScriptedTransport {
    gone: HashSet<String>,
    failing: HashSet<String>,
    /// (endpoint, note id) per attempt
    attempts: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    fn with_gone(endpoints: &[&str]) -> Self {
        Self {
            gone: endpoints.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }

    fn attempts(&self) -> Vec<(String, String)> {
        self.attempts.lock().unwrap().clone()
    }
}

impl PushTransport for ScriptedTransport {
    async fn deliver(&self, subscription: &SubscriptionRow, payload: &NotificationPayload) -> DeliveryOutcome {
        self.attempts
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), payload.data.note_id.clone()));

        if self.gone.contains(&subscription.endpoint) {
            DeliveryOutcome::EndpointGone
        } else if self.failing.contains(&subscription.endpoint) {
            DeliveryOutcome::TransientError("simulated network failure".to_string())
        } else {
            DeliveryOutcome::Delivered
        }
    }
}

fn seed_user(db: &Database, email: &str) -> String {
    let id = Uuid::new_v4().to_string();
    db.create_user(&id, email, "hash", None, None).unwrap();
    id
}

fn seed_notes(db: &Database, user_id: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let id = Uuid::new_v4().to_string();
            db.insert_note(&id, user_id, &format!("note number {}", i + 1)).unwrap();
            id
        })
        .collect()
}

fn seed_subscription(db: &Database, user_id: &str, endpoint: &str) -> String {
    let id = Uuid::new_v4().to_string();
    db.upsert_subscription(&NewSubscription {
        id: &id,
        user_id,
        endpoint,
        p256dh_key: "unused-by-scripted-transport",
        auth_key: "unused",
        user_agent: None,
    })
    .unwrap();
    id
}

fn endpoints_of(db: &Database, user_id: &str) -> Vec<String> {
    db.subscriptions_for_user(user_id)
        .unwrap()
        .into_iter()
        .map(|s| s.endpoint)
        .collect()
}

#[tokio::test]
async fn same_note_reaches_every_device_and_gone_endpoint_is_pruned() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let user = seed_user(&db, "a@example.com");
    let notes = seed_notes(&db, &user, 3);

    let endpoints = ["https://push.example/1", "https://push.example/2", "https://push.example/3", "https://push.example/4"];
    for endpoint in endpoints {
        seed_subscription(&db, &user, endpoint);
    }

    let notifier = DailyNotifier::new(db.clone(), ScriptedTransport::with_gone(&["https://push.example/3"]));
    let report = notifier.run_for_date(day_100()).await.unwrap();

    assert_eq!(report.day_of_year, 100);
    assert_eq!(report.users_processed, 1);
    assert_eq!(report.notifications_sent, 3);
    assert_eq!(report.subscriptions_removed, 1);
    assert_eq!(report.users_failed, 0);

    // 100 % 3 == 1: the second-oldest note, on all four devices
    let attempts = notifier.transport().attempts();
    assert_eq!(attempts.len(), 4);
    assert!(attempts.iter().all(|(_, note_id)| note_id == &notes[1]));

    let remaining = endpoints_of(&db, &user);
    assert_eq!(remaining.len(), 3);
    assert!(!remaining.contains(&"https://push.example/3".to_string()));
}

#[tokio::test]
async fn transient_failures_keep_the_subscription() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let user = seed_user(&db, "a@example.com");
    seed_notes(&db, &user, 2);
    seed_subscription(&db, &user, "https://push.example/flaky");
    seed_subscription(&db, &user, "https://push.example/fine");

    let transport = ScriptedTransport {
        failing: ["https://push.example/flaky".to_string()].into_iter().collect(),
        ..ScriptedTransport::default()
    };
    let report = DailyNotifier::new(db.clone(), transport)
        .run_for_date(day_100())
        .await
        .unwrap();

    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.subscriptions_removed, 0);
    assert_eq!(endpoints_of(&db, &user).len(), 2);
}

#[tokio::test]
async fn users_without_devices_are_skipped_not_failed() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let lonely = seed_user(&db, "nodevice@example.com");
    seed_notes(&db, &lonely, 4);
    let empty = seed_user(&db, "nonotes@example.com");
    seed_subscription(&db, &empty, "https://push.example/empty");

    let notifier = DailyNotifier::new(db.clone(), ScriptedTransport::default());
    let report = notifier.run_for_date(day_100()).await.unwrap();

    // The note-less user is not eligible at all; the device-less one is
    // considered and skipped.
    assert_eq!(report.users_processed, 1);
    assert_eq!(report.users_skipped, 1);
    assert_eq!(report.notifications_sent, 0);
    assert!(notifier.transport().attempts().is_empty());
}

#[tokio::test]
async fn inactive_users_are_ignored() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let user = seed_user(&db, "gone@example.com");
    seed_notes(&db, &user, 1);
    seed_subscription(&db, &user, "https://push.example/inactive");
    db.set_user_active(&user, false).unwrap();

    let report = DailyNotifier::new(db, ScriptedTransport::default())
        .run_for_date(day_100())
        .await
        .unwrap();

    assert_eq!(report.users_processed, 0);
    assert_eq!(report.notifications_sent, 0);
}

#[tokio::test]
async fn second_run_on_same_day_picks_same_note_and_finds_nothing_to_prune() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let user = seed_user(&db, "a@example.com");
    seed_notes(&db, &user, 5);
    seed_subscription(&db, &user, "https://push.example/live");
    seed_subscription(&db, &user, "https://push.example/dead");

    let notifier = DailyNotifier::new(db.clone(), ScriptedTransport::with_gone(&["https://push.example/dead"]));
    let first = notifier.run_for_date(day_100()).await.unwrap();
    let second = notifier.run_for_date(day_100()).await.unwrap();

    assert_eq!(first.notifications_sent, 1);
    assert_eq!(first.subscriptions_removed, 1);
    assert_eq!(second.notifications_sent, 1);
    assert_eq!(second.subscriptions_removed, 0);

    let attempts = notifier.transport().attempts();
    let picked: HashSet<&String> = attempts.iter().map(|(_, note)| note).collect();
    assert_eq!(picked.len(), 1, "both runs deliver the same note");
}

#[tokio::test]
async fn rotation_moves_to_next_note_the_following_day() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let user = seed_user(&db, "a@example.com");
    let notes = seed_notes(&db, &user, 3);
    seed_subscription(&db, &user, "https://push.example/1");

    let notifier = DailyNotifier::new(db, ScriptedTransport::default());
    notifier.run_for_date(day_100()).await.unwrap();
    notifier.run_for_date(day_100().succ_opt().unwrap()).await.unwrap();

    let attempts = notifier.transport().attempts();
    assert_eq!(attempts[0].1, notes[1]);
    assert_eq!(attempts[1].1, notes[2]);
}

/// Store wrapper that injects failures for chosen users or subscriptions.
struct FaultyStore {
    inner: Database,
    broken_user: Option<String>,
    /// Listed as eligible, but its notes are gone by the time they are read.
    emptied_user: Option<String>,
    undeletable: Option<String>,
}

impl NotificationStore for FaultyStore {
    fn active_users_with_notes(&self) -> Result<Vec<UserRow>> {
        self.inner.active_users_with_notes()
    }

    fn notes_for_user(&self, user_id: &str) -> Result<Vec<NoteRow>> {
        if self.broken_user.as_deref() == Some(user_id) {
            return Err(anyhow!("disk I/O error"));
        }
        if self.emptied_user.as_deref() == Some(user_id) {
            return Ok(Vec::new());
        }
        self.inner.notes_for_user_oldest_first(user_id)
    }

    fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionRow>> {
        self.inner.subscriptions_for_user(user_id)
    }

    fn delete_subscription(&self, subscription_id: &str) -> Result<bool> {
        if self.undeletable.as_deref() == Some(subscription_id) {
            return Err(anyhow!("database is locked"));
        }
        self.inner.delete_subscription(subscription_id)
    }
}

#[tokio::test]
async fn one_failing_user_does_not_affect_the_others() {
    let db = Database::open_in_memory().unwrap();
    let broken = seed_user(&db, "broken@example.com");
    seed_notes(&db, &broken, 2);
    seed_subscription(&db, &broken, "https://push.example/broken");

    let healthy = seed_user(&db, "healthy@example.com");
    seed_notes(&db, &healthy, 2);
    seed_subscription(&db, &healthy, "https://push.example/h1");
    seed_subscription(&db, &healthy, "https://push.example/h2");

    let store = Arc::new(FaultyStore {
        inner: db,
        broken_user: Some(broken),
        emptied_user: None,
        undeletable: None,
    });

    let report = DailyNotifier::new(store, ScriptedTransport::default())
        .run_for_date(day_100())
        .await
        .unwrap();

    assert_eq!(report.users_processed, 2);
    assert_eq!(report.users_failed, 1);
    assert_eq!(report.notifications_sent, 2);
}

#[tokio::test]
async fn failed_deletion_does_not_block_other_deletions() {
    let db = Database::open_in_memory().unwrap();
    let user = seed_user(&db, "a@example.com");
    seed_notes(&db, &user, 1);
    let stuck = seed_subscription(&db, &user, "https://push.example/stuck");
    seed_subscription(&db, &user, "https://push.example/dead");
    seed_subscription(&db, &user, "https://push.example/live");

    let store = Arc::new(FaultyStore {
        inner: db,
        broken_user: None,
        emptied_user: None,
        undeletable: Some(stuck),
    });

    let transport = ScriptedTransport::with_gone(&["https://push.example/stuck", "https://push.example/dead"]);
    let report = DailyNotifier::new(store.clone(), transport)
        .run_for_date(day_100())
        .await
        .unwrap();

    assert_eq!(report.users_failed, 0);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.subscriptions_removed, 1);

    let mut remaining = endpoints_of(&store.inner, &user);
    remaining.sort();
    assert_eq!(remaining, vec!["https://push.example/live", "https://push.example/stuck"]);
}

#[tokio::test]
async fn user_whose_notes_vanish_mid_run_is_skipped() {
    let db = Database::open_in_memory().unwrap();
    let user = seed_user(&db, "a@example.com");
    seed_notes(&db, &user, 2);
    seed_subscription(&db, &user, "https://push.example/1");

    let store = Arc::new(FaultyStore {
        inner: db,
        broken_user: None,
        emptied_user: Some(user),
        undeletable: None,
    });

    let notifier = DailyNotifier::new(store, ScriptedTransport::default());
    let report = notifier.run_for_date(day_100()).await.unwrap();

    assert_eq!(report.users_processed, 1);
    assert_eq!(report.users_skipped, 1);
    assert_eq!(report.users_failed, 0);
    assert_eq!(report.notifications_sent, 0);
    assert!(notifier.transport().attempts().is_empty());
}

/// Delivers everywhere except one endpoint, where it panics.
struct PanickingTransport {
    poisoned: &'static str,
    delivered: Mutex<Vec<String>>,
}

impl PushTransport for PanickingTransport {
    async fn deliver(&self, subscription: &SubscriptionRow, _payload: &NotificationPayload) -> DeliveryOutcome {
        if subscription.endpoint == self.poisoned {
            panic!("transport bug on {}", subscription.endpoint);
        }
        self.delivered.lock().unwrap().push(subscription.endpoint.clone());
        DeliveryOutcome::Delivered
    }
}

#[tokio::test]
async fn panicking_delivery_does_not_abort_the_run() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let first = seed_user(&db, "first@example.com");
    seed_notes(&db, &first, 1);
    seed_subscription(&db, &first, "https://push.example/bad");
    seed_subscription(&db, &first, "https://push.example/good-1");

    let second = seed_user(&db, "second@example.com");
    seed_notes(&db, &second, 1);
    seed_subscription(&db, &second, "https://push.example/good-2");

    let notifier = DailyNotifier::new(
        db.clone(),
        PanickingTransport {
            poisoned: "https://push.example/bad",
            delivered: Mutex::new(Vec::new()),
        },
    );
    let report = notifier.run_for_date(day_100()).await.unwrap();

    assert_eq!(report.users_processed, 2);
    assert_eq!(report.users_failed, 0);
    assert_eq!(report.notifications_sent, 2);
    assert_eq!(report.subscriptions_removed, 0);

    let mut delivered = notifier.transport().delivered.lock().unwrap().clone();
    delivered.sort();
    assert_eq!(delivered, vec!["https://push.example/good-1", "https://push.example/good-2"]);

    // A panic is not a 410; the subscription stays.
    assert_eq!(endpoints_of(&db, &first).len(), 2);
}
