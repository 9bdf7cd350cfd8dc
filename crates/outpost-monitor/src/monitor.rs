use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use outpost_core::config::ChannelIds;
use outpost_core::{MonitoringSession, RuntimeSettings, ScenarioTag, TrackableAction};
use outpost_store::Store;

const EVENT_QUEUE_CAPACITY: usize = 256;

/// Abstract platform event as seen by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    MessageCreate {
        user_id: String,
        channel_id: String,
        author_is_bot: bool,
    },
    MessageEdit {
        user_id: String,
        channel_id: String,
        author_is_bot: bool,
    },
    MessageDelete {
        user_id: String,
        channel_id: String,
    },
    VoiceStateChange {
        user_id: String,
        before_channel: Option<String>,
        after_channel: Option<String>,
    },
    InviteCreate {
        inviter_id: Option<String>,
    },
    ReactionAdd {
        user_id: String,
    },
    ReactionRemove {
        user_id: String,
    },
}

/// Tracks which users are monitored under which scenarios and routes events
/// to counter updates.
///
/// The in-memory mirror is authoritative for "is tracked?" decisions; the
/// store is authoritative for counters and durable session state. Lifecycle
/// writes update both under the mirror's write lock.
pub struct Monitor {
    pub(crate) store: Arc<Store>,
    pub(crate) settings: Arc<RuntimeSettings>,
    pub(crate) channels: ChannelIds,
    bot_user_id: String,
    pub(crate) mirror: RwLock<HashMap<String, MonitoringSession>>,
    tx: Mutex<Option<mpsc::Sender<MonitorEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(
        store: Arc<Store>,
        settings: Arc<RuntimeSettings>,
        channels: ChannelIds,
        bot_user_id: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            settings,
            channels,
            bot_user_id: bot_user_id.into(),
            mirror: RwLock::new(HashMap::new()),
            tx: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Load tracked users from the store, drop expired sessions, fill the
    /// mirror, and recreate any missing tasks. Call once at startup before
    /// `start`.
    pub async fn reconcile(&self) {
        let tracked = match self.store.list_tracked().await {
            Ok(tracked) => tracked,
            Err(e) => {
                error!(error = %e, "failed to list tracked users");
                return;
            }
        };
        let mut restored = 0usize;
        for user_id in tracked {
            let session = match self.store.get_active_session(&user_id).await {
                Ok(session) => session,
                Err(e) => {
                    error!(user_id, error = %e, "failed to load session");
                    continue;
                }
            };
            let Some(session) = session else {
                info!(user_id, "removing expired tracking entry");
                if let Err(e) = self.store.remove_tracked(&user_id).await {
                    error!(user_id, error = %e, "failed to remove tracked entry");
                }
                continue;
            };
            self.mirror
                .write()
                .await
                .insert(user_id.clone(), session.clone());
            restored += 1;
            if let Err(e) = self.recreate_tasks_for_user(&user_id, &session).await {
                error!(user_id, error = %e, "failed to recreate tasks");
            }
        }
        info!(tracked_users = restored, "monitoring state reconciled");
    }

    /// Spawn the single event-consuming routine.
    pub async fn start(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        *self.tx.lock().await = Some(tx);
        let monitor = self.clone();
        let worker = tokio::spawn(async move {
            info!("monitoring worker started");
            while let Some(event) = rx.recv().await {
                monitor.handle_event(event).await;
            }
            info!("monitoring worker stopped");
        });
        *self.worker.lock().await = Some(worker);
    }

    /// Queue a raw platform event. A full queue drops the event with a log
    /// line rather than blocking the dispatcher.
    pub async fn submit_event(&self, event: MonitorEvent) {
        let tx = self.tx.lock().await;
        match tx.as_ref() {
            Some(tx) => {
                if tx.try_send(event).is_err() {
                    error!("monitoring queue full, dropping event");
                }
            }
            None => error!("monitoring worker not running, dropping event"),
        }
    }

    /// Close the event queue and join the consumer.
    pub async fn stop(&self) {
        self.tx.lock().await.take();
        if let Some(worker) = self.worker.lock().await.take() {
            let _ = worker.await;
        }
    }

    // -- mirror reads -------------------------------------------------------

    pub async fn is_tracked(&self, user_id: &str) -> bool {
        self.mirror
            .read()
            .await
            .get(user_id)
            .map(|s| !s.is_expired())
            .unwrap_or(false)
    }

    pub async fn tracked_users(&self) -> Vec<String> {
        self.mirror.read().await.keys().cloned().collect()
    }

    pub async fn session_for(&self, user_id: &str) -> Option<MonitoringSession> {
        self.mirror.read().await.get(user_id).cloned()
    }

    pub async fn scenarios_for(&self, user_id: &str) -> Vec<ScenarioTag> {
        self.mirror
            .read()
            .await
            .get(user_id)
            .map(|s| s.scenarios.iter().copied().collect())
            .unwrap_or_default()
    }

    // -- event handling -----------------------------------------------------

    async fn handle_event(&self, event: MonitorEvent) {
        match event {
            MonitorEvent::MessageCreate {
                user_id,
                channel_id,
                author_is_bot,
            } => {
                if author_is_bot || user_id == self.bot_user_id {
                    return;
                }
                self.handle_message_create(&user_id, &channel_id).await;
            }
            MonitorEvent::MessageEdit {
                user_id,
                channel_id,
                author_is_bot,
            } => {
                if author_is_bot || user_id == self.bot_user_id {
                    return;
                }
                self.count_in_channel(&user_id, &channel_id, TrackableAction::MessageEdit)
                    .await;
            }
            MonitorEvent::MessageDelete { user_id, channel_id } => {
                self.count_in_channel(&user_id, &channel_id, TrackableAction::MessageDelete)
                    .await;
            }
            MonitorEvent::VoiceStateChange {
                user_id,
                before_channel,
                after_channel,
            } => match (before_channel, after_channel) {
                (None, Some(_)) => self.count(&user_id, TrackableAction::VoiceJoin).await,
                (Some(_), None) => self.count(&user_id, TrackableAction::VoiceLeave).await,
                _ => {}
            },
            MonitorEvent::InviteCreate { inviter_id } => {
                if let Some(user_id) = inviter_id {
                    self.count(&user_id, TrackableAction::InviteCreate).await;
                }
            }
            MonitorEvent::ReactionAdd { user_id } => {
                self.count(&user_id, TrackableAction::ReactionAdd).await;
            }
            MonitorEvent::ReactionRemove { user_id } => {
                self.count(&user_id, TrackableAction::ReactionRemove).await;
            }
        }
    }

    /// Active, non-expired scenarios for a user, from the mirror.
    async fn active_scenarios(&self, user_id: &str) -> Vec<ScenarioTag> {
        self.mirror
            .read()
            .await
            .get(user_id)
            .filter(|s| !s.is_expired())
            .map(|s| s.scenarios.iter().copied().collect())
            .unwrap_or_default()
    }

    async fn handle_message_create(&self, user_id: &str, channel_id: &str) {
        let scenarios = self.active_scenarios(user_id).await;
        if scenarios.is_empty() {
            return;
        }

        // Channel histogram first: every scenario that allows this channel
        // records the usage, whether or not it counts messages.
        for scenario in &scenarios {
            if !self.channels.is_channel_allowed(*scenario, channel_id) {
                continue;
            }
            if let Err(e) = self
                .store
                .incr_channel(user_id, *scenario, channel_id, 1)
                .await
            {
                error!(user_id, scenario = %scenario, error = %e, "failed to bump channel count");
            }
        }

        debug!(user_id, channel_id, "processing message for tracked user");
        self.count_in_channel(user_id, channel_id, TrackableAction::MessageCreate)
            .await;
    }

    /// Bump the action's counter for every active scenario that counts it
    /// and whose allow-list admits the channel.
    async fn count_in_channel(&self, user_id: &str, channel_id: &str, action: TrackableAction) {
        for scenario in self.active_scenarios(user_id).await {
            if !scenario.spec().counts(action) {
                continue;
            }
            if !self.channels.is_channel_allowed(scenario, channel_id) {
                continue;
            }
            if let Err(e) = self
                .store
                .incr_counter(user_id, scenario, action.counter_field(), 1)
                .await
            {
                error!(user_id, scenario = %scenario, error = %e, "failed to bump counter");
            }
        }
    }

    /// Bump the action's counter for every active scenario that counts it;
    /// no channel filter (voice, invites, reactions).
    async fn count(&self, user_id: &str, action: TrackableAction) {
        for scenario in self.active_scenarios(user_id).await {
            if !scenario.spec().counts(action) {
                continue;
            }
            if let Err(e) = self
                .store
                .incr_counter(user_id, scenario, action.counter_field(), 1)
                .await
            {
                error!(user_id, scenario = %scenario, error = %e, "failed to bump counter");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use outpost_core::BotConfig;
    use std::collections::HashMap as StdHashMap;

    pub(crate) fn test_channels() -> ChannelIds {
        let env: StdHashMap<String, String> = [
            ("BOT_TOKEN", "t"),
            ("GUILD_ID", "g"),
            ("STORE_PATH", ":memory:"),
            ("RECRUITMENT_CHANNEL_ID", "c-recruit"),
            ("GENERAL_CHANNEL_ID", "c-general"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        BotConfig::from_env_map(&env).unwrap().channels
    }

    async fn monitor_with(store: Arc<Store>) -> Arc<Monitor> {
        let monitor = Monitor::new(
            store,
            Arc::new(RuntimeSettings::default()),
            test_channels(),
            "bot",
        );
        monitor.start().await;
        monitor
    }

    async fn drain(monitor: &Arc<Monitor>) {
        // The consumer is a single routine; stopping joins it after the
        // queue is drained.
        monitor.stop().await;
    }

    #[tokio::test]
    async fn untracked_users_accumulate_nothing() {
        let store = Arc::new(Store::in_memory().unwrap());
        let monitor = monitor_with(store.clone()).await;
        monitor
            .submit_event(MonitorEvent::MessageCreate {
                user_id: "u".into(),
                channel_id: "c-general".into(),
                author_is_bot: false,
            })
            .await;
        drain(&monitor).await;
        assert!(store
            .counters_for_scenario("u", ScenarioTag::NewRecruit)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn channel_filter_gates_recruitment_process_messages() {
        let store = Arc::new(Store::in_memory().unwrap());
        let monitor = monitor_with(store.clone()).await;
        monitor
            .add_scenario("u", ScenarioTag::RecruitmentProcess)
            .await
            .unwrap();

        for channel in ["c-general", "c-recruit"] {
            monitor
                .submit_event(MonitorEvent::MessageCreate {
                    user_id: "u".into(),
                    channel_id: channel.into(),
                    author_is_bot: false,
                })
                .await;
        }
        drain(&monitor).await;

        let counters = store
            .counters_for_scenario("u", ScenarioTag::RecruitmentProcess)
            .await
            .unwrap();
        assert_eq!(counters.get("messages"), Some(&1), "only the allowed channel counts");
        // The histogram likewise only records the allowed channel.
        assert_eq!(
            store
                .top_channels("u", ScenarioTag::RecruitmentProcess, 10)
                .await
                .unwrap(),
            vec![("c-recruit".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn scenarios_update_independently_per_action_set() {
        let store = Arc::new(Store::in_memory().unwrap());
        let monitor = monitor_with(store.clone()).await;
        monitor
            .add_scenario("u", ScenarioTag::RecruitmentProcess)
            .await
            .unwrap();
        monitor
            .add_scenario("u", ScenarioTag::NewRecruit)
            .await
            .unwrap();

        // General-channel message: NewRecruit counts it, RecruitmentProcess
        // is filtered out. Voice join: only NewRecruit counts it.
        monitor
            .submit_event(MonitorEvent::MessageCreate {
                user_id: "u".into(),
                channel_id: "c-general".into(),
                author_is_bot: false,
            })
            .await;
        monitor
            .submit_event(MonitorEvent::VoiceStateChange {
                user_id: "u".into(),
                before_channel: None,
                after_channel: Some("voice-1".into()),
            })
            .await;
        drain(&monitor).await;

        let nr = store
            .counters_for_scenario("u", ScenarioTag::NewRecruit)
            .await
            .unwrap();
        assert_eq!(nr.get("messages"), Some(&1));
        assert_eq!(nr.get("voice_joins"), Some(&1));
        let rp = store
            .counters_for_scenario("u", ScenarioTag::RecruitmentProcess)
            .await
            .unwrap();
        assert_eq!(rp.get("messages"), Some(&0));
        assert!(!rp.contains_key("voice_joins"));
    }

    #[tokio::test]
    async fn voice_state_disambiguation() {
        let store = Arc::new(Store::in_memory().unwrap());
        let monitor = monitor_with(store.clone()).await;
        monitor
            .add_scenario("u", ScenarioTag::NewRecruit)
            .await
            .unwrap();

        monitor
            .submit_event(MonitorEvent::VoiceStateChange {
                user_id: "u".into(),
                before_channel: Some("v1".into()),
                after_channel: None,
            })
            .await;
        // Channel-to-channel moves are neither joins nor leaves.
        monitor
            .submit_event(MonitorEvent::VoiceStateChange {
                user_id: "u".into(),
                before_channel: Some("v1".into()),
                after_channel: Some("v2".into()),
            })
            .await;
        drain(&monitor).await;

        let counters = store
            .counters_for_scenario("u", ScenarioTag::NewRecruit)
            .await
            .unwrap();
        assert_eq!(counters.get("voice_joins"), Some(&0));
        // voice_leave is not in NewRecruit's action set, so not even a key.
        assert!(!counters.contains_key("voice_leaves"));
    }

    #[tokio::test]
    async fn bot_authored_messages_are_ignored() {
        let store = Arc::new(Store::in_memory().unwrap());
        let monitor = monitor_with(store.clone()).await;
        monitor
            .add_scenario("u", ScenarioTag::NewRecruit)
            .await
            .unwrap();
        monitor
            .submit_event(MonitorEvent::MessageCreate {
                user_id: "u".into(),
                channel_id: "c-general".into(),
                author_is_bot: true,
            })
            .await;
        drain(&monitor).await;
        assert_eq!(
            store
                .counters_for_scenario("u", ScenarioTag::NewRecruit)
                .await
                .unwrap()
                .get("messages"),
            Some(&0)
        );
    }

    #[tokio::test]
    async fn duplicate_events_count_twice() {
        // Events are deliberately not deduplicated: a replayed wire event
        // increments counters again.
        let store = Arc::new(Store::in_memory().unwrap());
        let monitor = monitor_with(store.clone()).await;
        monitor
            .add_scenario("u", ScenarioTag::NewRecruit)
            .await
            .unwrap();
        let event = MonitorEvent::MessageCreate {
            user_id: "u".into(),
            channel_id: "c-general".into(),
            author_is_bot: false,
        };
        monitor.submit_event(event.clone()).await;
        monitor.submit_event(event).await;
        drain(&monitor).await;
        assert_eq!(
            store
                .counters_for_scenario("u", ScenarioTag::NewRecruit)
                .await
                .unwrap()
                .get("messages"),
            Some(&2)
        );
    }

    #[tokio::test]
    async fn reconcile_drops_expired_and_restores_live_sessions() {
        let store = Arc::new(Store::in_memory().unwrap());

        // Expired tracked user: slot is gone once read, tracked entry swept.
        let mut dead = MonitoringSession::new("dead");
        dead.add_scenario(ScenarioTag::NewRecruit);
        dead.started_at = 10;
        dead.expires_at = 20;
        store.save_session(&dead).await.unwrap();

        let mut live = MonitoringSession::new("live");
        live.add_scenario(ScenarioTag::NewRecruit);
        live.expires_at = chrono::Utc::now().timestamp() + 3_600;
        store.save_session(&live).await.unwrap();

        let monitor = Monitor::new(
            store.clone(),
            Arc::new(RuntimeSettings::default()),
            test_channels(),
            "bot",
        );
        monitor.reconcile().await;

        assert!(monitor.is_tracked("live").await);
        assert!(!monitor.is_tracked("dead").await);
        assert_eq!(store.list_tracked().await.unwrap(), vec!["live"]);
        // Task recreation kicked in for the live session.
        assert!(!store.tasks_for_user("live").await.unwrap().is_empty());
    }
}
