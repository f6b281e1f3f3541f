use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use recall_db::Database;
use recall_db::models::{NoteRow, SubscriptionRow, UserRow};

use crate::delivery::{DeliveryOutcome, PushTransport};
use crate::{payload, selector};

/// The store operations a daily run needs. Calls are blocking; the
/// orchestrator runs them on the blocking pool.
pub trait NotificationStore: Send + Sync + 'static {
    /// Active users owning at least one note.
    fn active_users_with_notes(&self) -> Result<Vec<UserRow>>;
    /// A user's notes, oldest first, in a stable order.
    fn notes_for_user(&self, user_id: &str) -> Result<Vec<NoteRow>>;
    fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionRow>>;
    /// Ok(false) when the row was already gone.
    fn delete_subscription(&self, subscription_id: &str) -> Result<bool>;
}

impl NotificationStore for Database {
    fn active_users_with_notes(&self) -> Result<Vec<UserRow>> {
        Database::active_users_with_notes(self)
    }

    fn notes_for_user(&self, user_id: &str) -> Result<Vec<NoteRow>> {
        self.notes_for_user_oldest_first(user_id)
    }

    fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionRow>> {
        Database::subscriptions_for_user(self, user_id)
    }

    fn delete_subscription(&self, subscription_id: &str) -> Result<bool> {
        Database::delete_subscription(self, subscription_id)
    }
}

/// Aggregate result of one run.
///
/// `users_processed` counts every eligible user the run considered, whether
/// they were sent a notification, skipped, or failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub day_of_year: u32,
    pub users_processed: usize,
    pub notifications_sent: usize,
    pub users_skipped: usize,
    pub users_failed: usize,
    pub subscriptions_removed: usize,
}

enum UserResult {
    NoNote,
    NoSubscriptions,
    Delivered { sent: usize, removed: usize },
}

/// Runs the daily rotation once per call. Holds no schedule and no state
/// between runs, so calling it twice on one day re-selects the same notes.
pub struct DailyNotifier<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
}

impl<S: NotificationStore, T: PushTransport + 'static> DailyNotifier<S, T> {
    pub fn new(store: Arc<S>, transport: T) -> Self {
        Self {
            store,
            transport: Arc::new(transport),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn run_once(&self) -> Result<RunReport> {
        self.run_for_date(selector::reference_today()).await
    }

    /// One batch as if today were `today` in the reference timezone.
    ///
    /// Only loading the user list can fail the run. Every per-user problem,
    /// panics included, is logged and counted instead.
    pub async fn run_for_date(&self, today: NaiveDate) -> Result<RunReport> {
        let day_of_year = selector::day_of_year(today);
        info!("Starting daily notification run for {} (day {})", today, day_of_year);

        let users = blocking(&self.store, |store| store.active_users_with_notes()).await?;

        let mut report = RunReport {
            day_of_year,
            ..RunReport::default()
        };

        for user in users {
            report.users_processed += 1;
            let user_id = user.id.clone();

            // Own task per user: a panic anywhere in this user's work ends
            // up as a JoinError here instead of unwinding the batch.
            let task = tokio::spawn(process_user(
                self.store.clone(),
                self.transport.clone(),
                user,
                today,
            ));

            match task.await {
                Ok(Ok(UserResult::NoNote)) | Ok(Ok(UserResult::NoSubscriptions)) => report.users_skipped += 1,
                Ok(Ok(UserResult::Delivered { sent, removed })) => {
                    report.notifications_sent += sent;
                    report.subscriptions_removed += removed;
                }
                Ok(Err(e)) => {
                    error!("Failed to process notifications for user {}: {:#}", user_id, e);
                    report.users_failed += 1;
                }
                Err(e) => {
                    error!("Notification task for user {} aborted: {}", user_id, e);
                    report.users_failed += 1;
                }
            }
        }

        info!(
            "Daily notification run complete: {} users processed ({} skipped, {} failed), {} notifications sent, {} subscriptions removed",
            report.users_processed,
            report.users_skipped,
            report.users_failed,
            report.notifications_sent,
            report.subscriptions_removed
        );

        Ok(report)
    }
}

async fn process_user<S: NotificationStore, T: PushTransport + 'static>(
    store: Arc<S>,
    transport: Arc<T>,
    user: UserRow,
    today: NaiveDate,
) -> Result<UserResult> {
    let user_id = user.id.clone();
    let notes = blocking(&store, move |store| store.notes_for_user(&user_id)).await?;

    let Some(note) = selector::select_for_day(&notes, today) else {
        info!("No notes found for user {}, skipping", user.id);
        return Ok(UserResult::NoNote);
    };

    info!(
        "Selected note {} for user {} (day {}, {} notes)",
        note.id,
        user.id,
        selector::day_of_year(today),
        notes.len()
    );

    let user_id = user.id.clone();
    let subscriptions = blocking(&store, move |store| store.subscriptions_for_user(&user_id)).await?;

    if subscriptions.is_empty() {
        info!("No push subscriptions for user {}, skipping", user.id);
        return Ok(UserResult::NoSubscriptions);
    }

    // One payload per user; every device gets the same note.
    let payload = Arc::new(payload::build(note, Utc::now()));

    let deliveries: Vec<_> = subscriptions
        .iter()
        .map(|subscription| {
            let transport = transport.clone();
            let payload = payload.clone();
            let subscription = subscription.clone();
            tokio::spawn(async move { transport.deliver(&subscription, &payload).await })
        })
        .collect();

    let outcomes = join_all(deliveries).await;

    let mut sent = 0;
    let mut gone = Vec::new();

    for (subscription, outcome) in subscriptions.iter().zip(outcomes) {
        let outcome = outcome.unwrap_or_else(|e| DeliveryOutcome::TransientError(format!("delivery task aborted: {}", e)));

        match outcome {
            DeliveryOutcome::Delivered => {
                debug!("Delivered to subscription {} for user {}", subscription.id, user.id);
                sent += 1;
            }
            DeliveryOutcome::EndpointGone => {
                info!(
                    "Subscription {} for user {} is gone, marking for removal",
                    subscription.id, user.id
                );
                gone.push(subscription.id.clone());
            }
            DeliveryOutcome::TransientError(reason) => {
                warn!(
                    "Delivery to subscription {} for user {} failed: {}",
                    subscription.id, user.id, reason
                );
            }
        }
    }

    let removed = remove_subscriptions(&store, gone).await;

    info!(
        "Sent {} of {} notifications to user {} for note {}",
        sent,
        subscriptions.len(),
        user.id,
        note.id
    );

    Ok(UserResult::Delivered { sent, removed })
}

/// Each deletion stands alone; one failure does not stop the rest.
async fn remove_subscriptions<S: NotificationStore>(store: &Arc<S>, ids: Vec<String>) -> usize {
    let mut removed = 0;

    for id in ids {
        let target = id.clone();
        match blocking(store, move |store| store.delete_subscription(&target)).await {
            Ok(true) => {
                info!("Removed invalid subscription {}", id);
                removed += 1;
            }
            Ok(false) => debug!("Subscription {} was already removed", id),
            Err(e) => warn!("Failed to remove subscription {}: {:#}", id, e),
        }
    }

    removed
}

async fn blocking<S, F, R>(store: &Arc<S>, f: F) -> Result<R>
where
    S: NotificationStore,
    F: FnOnce(&S) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| anyhow!("store task failed: {}", e))?
}
