use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::modules::api::{ApiResult, NotificationApi, PollResponse};
use crate::modules::dispatcher::{DispatchReport, SideEffectDispatcher};
use crate::modules::notifications::{
    CACHE_LIMIT, Notification, NotificationCache, NotificationPreferences, NotificationType,
};
use crate::modules::poller::{DeltaPoller, TickOutcome};
use crate::modules::toast::ToastQueue;

pub struct CenterOptions {
    pub poll_interval: Duration,
    pub max_toasts: usize,
    pub hide_delay: Duration,
    pub auto_hide: bool,
    pub auto_mark_as_read: bool,
}

/// What one settled poll did to local state.
#[derive(Debug, Default, PartialEq)]
pub struct PollUpdate {
    pub added: Vec<Notification>,
    pub dispatch: DispatchReport,
}

/// Client-side notification state: cache, preferences, poll cursor and toasts.
///
/// Mutation results are applied only after the server confirms them; a failed
/// call sets [`NotificationCenter::error`] and leaves local state as it was.
pub struct NotificationCenter {
    api: Arc<dyn NotificationApi>,
    pub cache: NotificationCache,
    pub preferences: NotificationPreferences,
    pub toasts: ToastQueue,
    pub loading: bool,
    pub error: Option<String>,
    pub auto_mark_as_read: bool,
    poller: DeltaPoller,
    dispatcher: SideEffectDispatcher,
}

impl NotificationCenter {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        dispatcher: SideEffectDispatcher,
        opts: CenterOptions,
    ) -> Self {
        let poller = DeltaPoller::new(Arc::clone(&api), opts.poll_interval);
        Self {
            api,
            cache: NotificationCache::new(),
            preferences: NotificationPreferences::default(),
            toasts: ToastQueue::new(opts.max_toasts, opts.hide_delay).with_auto_hide(opts.auto_hide),
            loading: false,
            error: None,
            auto_mark_as_read: opts.auto_mark_as_read,
            poller,
            dispatcher,
        }
    }

    /// Mount-time setup: permission prompt and the first full load.
    pub async fn start(&mut self) {
        self.dispatcher.setup();
        self.load().await;
    }

    /// Loads the first page, unread count and preferences concurrently.
    /// Whatever succeeds is kept even when another request fails.
    pub async fn load(&mut self) {
        self.loading = true;
        self.error = None;
        let (list, count, prefs) = tokio::join!(
            self.api.list(CACHE_LIMIT),
            self.api.unread_count(),
            self.api.preferences()
        );

        let mut failures = Vec::new();
        match list {
            Ok(items) => self.cache.replace(items),
            Err(e) => failures.push(format!("notifications: {e}")),
        }
        match count {
            Ok(count) => self.cache.set_unread_count(count),
            Err(e) => failures.push(format!("unread count: {e}")),
        }
        match prefs {
            Ok(prefs) => self.preferences = prefs,
            Err(e) => failures.push(format!("preferences: {e}")),
        }

        self.poller.reset_cursor(Utc::now());
        self.loading = false;
        if failures.is_empty() {
            info!(cached = self.cache.len(), unread = self.cache.unread_count, "notifications loaded");
        } else {
            let msg = format!("Failed to load {}", failures.join(", "));
            warn!(error = %msg, "initial load incomplete");
            self.error = Some(msg);
        }
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        self.poller.cursor()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_in_flight()
    }

    /// Drives the poll timer and the toast timers. Called from the UI loop.
    pub fn tick(&mut self, now: Instant) -> Option<PollUpdate> {
        self.poller.tick(now);
        let update = self.poller.collect().and_then(|res| self.apply_poll(res, now));
        self.toasts.tick(now);
        update
    }

    pub fn poll_now(&mut self) -> TickOutcome {
        self.poller.poll_now()
    }

    /// Waits for the outstanding poll and applies it.
    #[cfg(test)]
    pub async fn settle_poll(&mut self, now: Instant) -> Option<PollUpdate> {
        let res = self.poller.settle().await?;
        self.apply_poll(res, now)
    }

    fn apply_poll(&mut self, res: ApiResult<PollResponse>, now: Instant) -> Option<PollUpdate> {
        // poll failures stay out of `error`; the next tick retries
        let poll = res.ok()?;
        if !poll.has_new_notifications {
            return None;
        }
        let added = self.cache.apply(&poll.notifications);
        let dispatch = self.dispatcher.dispatch(&added, &self.preferences);
        let toastable: Vec<Notification> = added
            .iter()
            .filter(|n| self.preferences.allows(n.category()))
            .cloned()
            .collect();
        self.toasts.push(&toastable, now);
        let cache = &self.cache;
        self.toasts.retain(now, |n| cache.items.iter().any(|c| c.id == n.id));
        debug!(added = added.len(), ?dispatch, "poll applied");
        Some(PollUpdate { added, dispatch })
    }

    pub async fn mark_read(&mut self, id: &str) -> bool {
        match self.api.mark_read(id).await {
            Ok(()) => {
                self.cache.mark_read(id);
                self.toasts.forget(id, Instant::now());
                true
            }
            Err(e) => {
                self.error = Some(format!("Failed to mark notification as read: {e}"));
                false
            }
        }
    }

    pub async fn mark_all_read(&mut self) -> bool {
        match self.api.mark_all_read().await {
            Ok(()) => {
                self.cache.mark_all_read();
                self.toasts.dismiss_all(Instant::now());
                true
            }
            Err(e) => {
                self.error = Some(format!("Failed to mark all as read: {e}"));
                false
            }
        }
    }

    /// Sends the new preferences and adopts the server's copy wholesale.
    pub async fn update_preferences(&mut self, prefs: NotificationPreferences) -> bool {
        match self.api.update_preferences(&prefs).await {
            Ok(saved) => {
                self.preferences = saved;
                true
            }
            Err(e) => {
                self.error = Some(format!("Failed to update preferences: {e}"));
                false
            }
        }
    }

    pub async fn send_test(&mut self, kind: NotificationType) -> bool {
        match self.api.send_test(kind).await {
            Ok(()) => true,
            Err(e) => {
                self.error = Some(format!("Failed to send test notification: {e}"));
                false
            }
        }
    }

    /// Marks an item read as part of opening it, when configured to.
    pub async fn opened(&mut self, id: &str) {
        let unread = self.cache.items.iter().any(|n| n.id == id && !n.is_read);
        if self.auto_mark_as_read && unread {
            self.mark_read(id).await;
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::api::ApiError;
    use crate::modules::dispatcher::tests::{Calls, FakeCaps};
    use crate::modules::notifications::Priority;
    use crate::modules::notifications::tests::sample;
    use crate::modules::poller::tests::{FakeApi, poll_with};
    use crate::modules::toast::EXIT_WINDOW;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn center(api: Arc<FakeApi>) -> (NotificationCenter, Arc<Mutex<Calls>>) {
        let (caps, calls) = FakeCaps::granted();
        let dispatcher = SideEffectDispatcher::new(Box::new(caps), true, true);
        let opts = CenterOptions {
            poll_interval: Duration::from_secs(30),
            max_toasts: 3,
            hide_delay: Duration::from_secs(5),
            auto_hide: true,
            auto_mark_as_read: false,
        };
        (NotificationCenter::new(api, dispatcher, opts), calls)
    }

    fn ids(list: &[Notification]) -> Vec<&str> {
        list.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn poll_with_duplicate_adds_only_new_item() {
        let api = Arc::new(FakeApi::default());
        *api.list.lock().unwrap() = Some(Ok(vec![
            sample("1", Priority::Low, true, 0),
            sample("2", Priority::Low, false, 1),
        ]));
        *api.count.lock().unwrap() = Some(Ok(1));
        api.push_poll(poll_with(
            vec![sample("3", Priority::Medium, false, 5), sample("1", Priority::Medium, false, 6)],
            "2024-01-01T00:00:02Z",
        ));
        let (mut center, calls) = center(api);

        center.start().await;
        center.poll_now();
        let update = center.settle_poll(Instant::now()).await.unwrap();

        assert_eq!(ids(&center.cache.items), vec!["3", "1", "2"]);
        assert!(center.cache.items[1].is_read);
        assert_eq!(center.cache.unread_count, 2);
        assert_eq!(ids(&update.added), vec!["3"]);
        assert_eq!(center.cursor(), "2024-01-01T00:00:02Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(calls.lock().unwrap().shown, vec!["3".to_string()]);
        assert_eq!(center.toasts.visible().len(), 1);
    }

    #[tokio::test]
    async fn empty_poll_changes_nothing() {
        let api = Arc::new(FakeApi::default());
        *api.list.lock().unwrap() = Some(Ok(vec![sample("1", Priority::Low, false, 0)]));
        *api.count.lock().unwrap() = Some(Ok(1));
        api.push_poll(poll_with(Vec::new(), "2030-01-01T00:00:00Z"));
        let (mut center, calls) = center(api);

        center.start().await;
        let cursor = center.cursor();
        center.poll_now();
        assert!(center.settle_poll(Instant::now()).await.is_none());

        assert_eq!(ids(&center.cache.items), vec!["1"]);
        assert_eq!(center.cache.unread_count, 1);
        assert_eq!(center.cursor(), cursor);
        assert_eq!(calls.lock().unwrap().plays, 0);
    }

    #[tokio::test]
    async fn failed_poll_is_silent() {
        let api = Arc::new(FakeApi::default());
        api.push_poll(Err(ApiError::Rejected("gateway timeout".into())));
        let (mut center, _) = center(api);

        center.start().await;
        let cursor = center.cursor();
        center.poll_now();
        assert!(center.settle_poll(Instant::now()).await.is_none());

        assert!(center.error.is_none());
        assert_eq!(center.cursor(), cursor);
    }

    #[tokio::test]
    async fn partial_initial_load_keeps_successes() {
        let api = Arc::new(FakeApi::default());
        *api.list.lock().unwrap() = Some(Ok(vec![sample("1", Priority::High, false, 0)]));
        *api.count.lock().unwrap() = Some(Ok(7));
        *api.prefs.lock().unwrap() = Some(Err(ApiError::Rejected("forbidden".into())));
        let (mut center, _) = center(api);

        center.start().await;

        assert!(!center.loading);
        assert!(center.error.as_deref().unwrap().contains("preferences"));
        assert_eq!(center.cache.len(), 1);
        assert_eq!(center.cache.unread_count, 7);
        assert_eq!(center.preferences, NotificationPreferences::default());
    }

    #[tokio::test]
    async fn failed_mark_read_leaves_state() {
        let api = Arc::new(FakeApi::default());
        *api.list.lock().unwrap() = Some(Ok(vec![sample("1", Priority::Low, false, 0)]));
        *api.count.lock().unwrap() = Some(Ok(1));
        *api.fail_mutations.lock().unwrap() = true;
        let (mut center, _) = center(api.clone());
        center.start().await;

        assert!(!center.mark_read("1").await);
        assert!(!center.cache.items[0].is_read);
        assert_eq!(center.cache.unread_count, 1);
        assert!(center.error.is_some());

        *api.fail_mutations.lock().unwrap() = false;
        center.clear_error();
        assert!(center.mark_all_read().await);
        assert_eq!(center.cache.unread_count, 0);
        assert!(center.cache.items.iter().all(|n| n.is_read));
    }

    #[tokio::test]
    async fn preferences_replaced_only_on_success() {
        let api = Arc::new(FakeApi::default());
        let (mut center, _) = center(api.clone());
        center.start().await;

        let quiet = NotificationPreferences { sound_enabled: false, ..Default::default() };
        *api.fail_mutations.lock().unwrap() = true;
        assert!(!center.update_preferences(quiet.clone()).await);
        assert!(center.preferences.sound_enabled);

        *api.fail_mutations.lock().unwrap() = false;
        assert!(center.update_preferences(quiet.clone()).await);
        assert_eq!(center.preferences, quiet);
    }

    #[tokio::test]
    async fn sound_off_poll_does_not_play() {
        let api = Arc::new(FakeApi::default());
        *api.prefs.lock().unwrap() =
            Some(Ok(NotificationPreferences { sound_enabled: false, ..Default::default() }));
        api.push_poll(poll_with(vec![sample("9", Priority::Urgent, false, 0)], "2024-01-01T00:00:05Z"));
        let (mut center, calls) = center(api);

        center.start().await;
        center.poll_now();
        let update = center.settle_poll(Instant::now()).await.unwrap();

        assert!(!update.dispatch.sound_played);
        assert_eq!(calls.lock().unwrap().plays, 0);
    }

    #[tokio::test]
    async fn mark_all_read_clears_toasts() {
        let api = Arc::new(FakeApi::default());
        api.push_poll(poll_with(
            (0..5).map(|i| sample(&format!("n{i}"), Priority::High, false, i)).collect(),
            "2024-01-01T00:00:05Z",
        ));
        let (mut center, _) = center(api);
        center.start().await;
        center.poll_now();
        center.settle_poll(Instant::now()).await.unwrap();
        assert_eq!(center.toasts.visible().len(), 3);

        assert!(center.mark_all_read().await);

        assert!(center.toasts.visible().iter().all(|t| t.is_exiting()));
        center.tick(Instant::now() + EXIT_WINDOW);
        assert!(center.toasts.is_empty());
    }

    #[tokio::test]
    async fn opening_marks_read_only_when_configured() {
        let api = Arc::new(FakeApi::default());
        *api.list.lock().unwrap() = Some(Ok(vec![
            sample("1", Priority::Low, false, 1),
            sample("2", Priority::Low, false, 0),
        ]));
        *api.count.lock().unwrap() = Some(Ok(2));
        let (mut center, _) = center(api);
        center.start().await;

        center.opened("1").await;
        assert!(!center.cache.items[0].is_read);
        assert_eq!(center.cache.unread_count, 2);

        center.auto_mark_as_read = true;
        center.opened("1").await;
        assert!(center.cache.items[0].is_read);
        assert_eq!(center.cache.unread_count, 1);
        assert!(center.error.is_none());
    }
}
