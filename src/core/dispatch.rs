use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, Timelike};
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use super::error::EngineError;
use super::rotation::{CategoryPolicy, PromptAssignment, RotationEngine};
use super::store::ScheduleStore;
use super::store::types::SchedulePreference;

/// Outbound messaging collaborator: deliver text to a user, succeed or
/// fail. Failures never escape the dispatcher's per-user boundary.
#[async_trait]
pub trait PromptDelivery: Send + Sync {
    async fn send(&self, user_id: &str, text: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub user_id: String,
    pub outcome: DispatchOutcome,
}

/// Outcome summary of one tick. Logged and discarded, never persisted.
#[derive(Debug, Default)]
pub struct DispatchRun {
    pub entries: Vec<DispatchEntry>,
}

impl DispatchRun {
    pub fn sent(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == DispatchOutcome::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.sent()
    }
}

/// Timer-driven fan-out: once per minute, find every user whose schedule
/// matches "now" and hand each one their next prompt. Users are fully
/// independent; one user's store or delivery failure is logged and
/// recorded, and the rest of the batch proceeds.
pub struct WeeklyDispatcher {
    engine: Arc<RotationEngine>,
    schedules: Arc<ScheduleStore>,
    delivery: Arc<dyn PromptDelivery>,
    batch_size: usize,
    per_user_timeout: Duration,
}

/// ISO week slot used as the per-(user, week) idempotency marker.
fn week_identifier(now: &DateTime<Local>) -> String {
    now.format("%G-W%V").to_string()
}

fn is_eligible(pref: &SchedulePreference, now: &DateTime<Local>, week_id: &str) -> bool {
    pref.enabled
        && u32::from(pref.day_of_week) == now.weekday().num_days_from_sunday()
        && u32::from(pref.hour) == now.hour()
        && u32::from(pref.minute) == now.minute()
        && pref.last_dispatched_week.as_deref() != Some(week_id)
}

fn weekly_message(assignment: &PromptAssignment) -> String {
    format!(
        "🌟 Weekly Reflection Time! — {}\n\n{}\n\nReply right here to save your reflection.",
        assignment.category.label(),
        assignment.text
    )
}

/// One user's unit of work: stamp the week marker, advance the rotation,
/// deliver. The marker goes in first so a retried tick in the same slot is
/// a no-op; rotation progress is recorded before delivery is attempted, so
/// a failed send costs the user this week's prompt but never corrupts the
/// cycle.
async fn dispatch_user(
    engine: Arc<RotationEngine>,
    schedules: Arc<ScheduleStore>,
    delivery: Arc<dyn PromptDelivery>,
    mut pref: SchedulePreference,
    week_id: String,
) -> Result<(), EngineError> {
    pref.last_dispatched_week = Some(week_id);
    schedules.put(&pref).await?;

    let assignment = engine
        .next_prompt_for(&pref.user_id, CategoryPolicy::Alternate)
        .await?;
    delivery
        .send(&pref.user_id, &weekly_message(&assignment))
        .await
}

impl WeeklyDispatcher {
    pub fn new(
        engine: Arc<RotationEngine>,
        schedules: Arc<ScheduleStore>,
        delivery: Arc<dyn PromptDelivery>,
        batch_size: usize,
        per_user_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            schedules,
            delivery,
            batch_size: batch_size.max(1),
            per_user_timeout,
        }
    }

    /// Register the per-minute tick on the scheduler. Callers must only do
    /// this after the store connection has been established.
    pub async fn register(self: Arc<Self>, scheduler: &JobScheduler) -> anyhow::Result<()> {
        let dispatcher = self;
        let job = Job::new_async("0 * * * * *", move |_uuid, mut _l| {
            let dispatcher = dispatcher.clone();
            Box::pin(async move {
                dispatcher.run_tick(Local::now()).await;
            })
        })?;
        scheduler.add(job).await?;
        Ok(())
    }

    /// Execute one tick against the given instant. A storage outage while
    /// listing schedules skips the tick entirely; eligible users are
    /// retried on their next scheduled slot, never mid-week.
    pub async fn run_tick(&self, now: DateTime<Local>) -> DispatchRun {
        let week_id = week_identifier(&now);

        let prefs = match self.schedules.all().await {
            Ok(prefs) => prefs,
            Err(e) => {
                error!("Dispatch tick skipped, could not list schedules: {}", e);
                return DispatchRun::default();
            }
        };

        let eligible: Vec<SchedulePreference> = prefs
            .into_iter()
            .filter(|p| is_eligible(p, &now, &week_id))
            .collect();

        if eligible.is_empty() {
            return DispatchRun::default();
        }
        info!("Dispatching prompts to {} eligible users", eligible.len());

        let mut run = DispatchRun::default();
        for batch in eligible.chunks(self.batch_size) {
            let mut set = JoinSet::new();
            for pref in batch {
                let engine = self.engine.clone();
                let schedules = self.schedules.clone();
                let delivery = self.delivery.clone();
                let pref = pref.clone();
                let week_id = week_id.clone();
                let timeout = self.per_user_timeout;

                set.spawn(async move {
                    let user_id = pref.user_id.clone();
                    let work = dispatch_user(engine, schedules, delivery, pref, week_id);
                    let outcome = match tokio::time::timeout(timeout, work).await {
                        Ok(Ok(())) => DispatchOutcome::Success,
                        Ok(Err(e)) => DispatchOutcome::Failure(e.to_string()),
                        Err(_) => DispatchOutcome::Failure(format!(
                            "timed out after {:?}",
                            timeout
                        )),
                    };
                    DispatchEntry { user_id, outcome }
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(entry) => {
                        if let DispatchOutcome::Failure(reason) = &entry.outcome {
                            warn!("Prompt dispatch failed for user {}: {}", entry.user_id, reason);
                        }
                        run.entries.push(entry);
                    }
                    Err(e) => error!("Dispatch task panicked: {}", e),
                }
            }
        }

        info!(
            "Dispatch tick complete: {} sent, {} failed",
            run.sent(),
            run.failed()
        );
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::PromptCatalog;
    use crate::core::rotation::RotationSelector;
    use crate::core::store::{Persistence, SqliteStore, UserProgressStore};
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockDelivery {
        sent: Mutex<Vec<(String, String)>>,
        fail_for: HashSet<String>,
        delay: Option<Duration>,
    }

    impl MockDelivery {
        fn failing_for(user_ids: &[&str]) -> Self {
            Self {
                fail_for: user_ids.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn sent_to(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(user, _)| user.clone())
                .collect()
        }
    }

    #[async_trait]
    impl PromptDelivery for MockDelivery {
        async fn send(&self, user_id: &str, text: &str) -> Result<(), EngineError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_for.contains(user_id) {
                return Err(EngineError::Delivery {
                    user_id: user_id.to_string(),
                    reason: "chat unreachable".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: WeeklyDispatcher,
        schedules: Arc<ScheduleStore>,
        progress: UserProgressStore,
        delivery: Arc<MockDelivery>,
    }

    fn fixture_with(delivery: MockDelivery, per_user_timeout: Duration) -> Fixture {
        let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
        let catalog = Arc::new(PromptCatalog::load().unwrap());
        let engine = Arc::new(RotationEngine::new(
            RotationSelector::new(catalog),
            UserProgressStore::new(store.clone()),
        ));
        let schedules = Arc::new(ScheduleStore::new(store.clone()));
        let delivery = Arc::new(delivery);
        let dispatcher = WeeklyDispatcher::new(
            engine,
            schedules.clone(),
            delivery.clone(),
            50,
            per_user_timeout,
        );
        Fixture {
            dispatcher,
            schedules,
            progress: UserProgressStore::new(store),
            delivery,
        }
    }

    fn fixture(delivery: MockDelivery) -> Fixture {
        fixture_with(delivery, Duration::from_secs(5))
    }

    fn tick_instant() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap()
    }

    async fn schedule_at(fx: &Fixture, user_id: &str, now: &DateTime<Local>) {
        let day = now.weekday().num_days_from_sunday() as u8;
        fx.schedules
            .update(user_id, |p| {
                p.day_of_week = day;
                p.hour = now.hour() as u8;
                p.minute = now.minute() as u8;
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delivers_to_every_matching_user_and_records_progress() {
        let fx = fixture(MockDelivery::default());
        let now = tick_instant();
        for user in ["x", "y", "z"] {
            schedule_at(&fx, user, &now).await;
        }

        let run = fx.dispatcher.run_tick(now).await;
        assert_eq!(run.sent(), 3);
        assert_eq!(run.failed(), 0);

        let mut delivered = fx.delivery.sent_to();
        delivered.sort();
        assert_eq!(delivered, vec!["x", "y", "z"]);

        for user in ["x", "y", "z"] {
            let progress = fx.progress.get(user).await.unwrap().unwrap();
            assert_eq!(progress.total_prompts_shown, 1);
        }
    }

    #[tokio::test]
    async fn skips_disabled_and_non_matching_schedules() {
        let fx = fixture(MockDelivery::default());
        let now = tick_instant();

        schedule_at(&fx, "match", &now).await;
        schedule_at(&fx, "disabled", &now).await;
        fx.schedules
            .update("disabled", |p| p.enabled = false)
            .await
            .unwrap();
        fx.schedules
            .update("wrong-hour", |p| {
                p.day_of_week = now.weekday().num_days_from_sunday() as u8;
                p.hour = (now.hour() as u8 + 1) % 24;
                p.minute = now.minute() as u8;
            })
            .await
            .unwrap();
        fx.schedules
            .update("wrong-minute", |p| {
                p.day_of_week = now.weekday().num_days_from_sunday() as u8;
                p.hour = now.hour() as u8;
                p.minute = now.minute() as u8 + 1;
            })
            .await
            .unwrap();

        let run = fx.dispatcher.run_tick(now).await;
        assert_eq!(run.sent(), 1);
        assert_eq!(fx.delivery.sent_to(), vec!["match"]);
    }

    #[tokio::test]
    async fn one_users_failure_never_aborts_the_batch() {
        let fx = fixture(MockDelivery::failing_for(&["x"]));
        let now = tick_instant();
        for user in ["x", "y", "z"] {
            schedule_at(&fx, user, &now).await;
        }

        let run = fx.dispatcher.run_tick(now).await;
        assert_eq!(run.sent(), 2);
        assert_eq!(run.failed(), 1);

        let failed: Vec<&str> = run
            .entries
            .iter()
            .filter(|e| matches!(e.outcome, DispatchOutcome::Failure(_)))
            .map(|e| e.user_id.as_str())
            .collect();
        assert_eq!(failed, vec!["x"]);

        // Progress was recorded before delivery was attempted; the failed
        // user's rotation still advanced and is not rolled back.
        let progress = fx.progress.get("x").await.unwrap().unwrap();
        assert_eq!(progress.total_prompts_shown, 1);
    }

    #[tokio::test]
    async fn same_slot_is_never_dispatched_twice() {
        let fx = fixture(MockDelivery::default());
        let now = tick_instant();
        schedule_at(&fx, "once", &now).await;

        let first = fx.dispatcher.run_tick(now).await;
        assert_eq!(first.sent(), 1);

        let second = fx.dispatcher.run_tick(now).await;
        assert!(second.entries.is_empty(), "retried tick must be a no-op");
        assert_eq!(fx.delivery.sent_to().len(), 1);
    }

    #[tokio::test]
    async fn slow_delivery_times_out_as_a_per_user_failure() {
        let delivery = MockDelivery {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let fx = fixture_with(delivery, Duration::from_millis(20));
        let now = tick_instant();
        schedule_at(&fx, "slow", &now).await;

        let run = fx.dispatcher.run_tick(now).await;
        assert_eq!(run.failed(), 1);
        match &run.entries[0].outcome {
            DispatchOutcome::Failure(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn storage_outage_skips_the_tick() {
        struct DownStore;

        #[async_trait]
        impl Persistence for DownStore {
            async fn get(
                &self,
                _collection: &str,
                _key: &str,
            ) -> Result<Option<serde_json::Value>, EngineError> {
                Err(EngineError::StoreUnavailable("down".to_string()))
            }
            async fn put(
                &self,
                _collection: &str,
                _key: &str,
                _record: serde_json::Value,
            ) -> Result<(), EngineError> {
                Err(EngineError::StoreUnavailable("down".to_string()))
            }
            async fn query(
                &self,
                _collection: &str,
            ) -> Result<Vec<(String, serde_json::Value)>, EngineError> {
                Err(EngineError::StoreUnavailable("down".to_string()))
            }
        }

        let catalog = Arc::new(PromptCatalog::load().unwrap());
        let down: Arc<dyn Persistence> = Arc::new(DownStore);
        let dispatcher = WeeklyDispatcher::new(
            Arc::new(RotationEngine::new(
                RotationSelector::new(catalog),
                UserProgressStore::new(down.clone()),
            )),
            Arc::new(ScheduleStore::new(down)),
            Arc::new(MockDelivery::default()),
            50,
            Duration::from_secs(5),
        );

        let run = dispatcher.run_tick(tick_instant()).await;
        assert!(run.entries.is_empty());
    }

    #[test]
    fn week_identifier_is_stable_within_a_week() {
        let monday = Local.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap();
        let friday = Local.with_ymd_and_hms(2026, 8, 7, 18, 30, 0).unwrap();
        let next_monday = Local.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap();
        assert_eq!(week_identifier(&monday), week_identifier(&friday));
        assert_ne!(week_identifier(&monday), week_identifier(&next_monday));
    }
}
