use anyhow::{Context, Result};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use url::Url;

use crate::config::Config;
use crate::modules::activity::{ActivityLog, Level};
use crate::modules::api::{HttpNotificationApi, NotificationApi};
use crate::modules::center::{CenterOptions, NotificationCenter, PollUpdate};
use crate::modules::dispatcher::{DesktopCapabilities, SideEffectDispatcher};
use crate::modules::error_log::ErrorReporter;
use crate::modules::notifications::{NotificationType, PreferenceToggle};
use crate::modules::poller::TickOutcome;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MenuSection {
    Inbox,
    Preferences,
    Activity,
}

impl MenuSection {
    pub const ALL: [MenuSection; 3] =
        [MenuSection::Inbox, MenuSection::Preferences, MenuSection::Activity];

    pub fn title(&self) -> &'static str {
        match self {
            MenuSection::Inbox => "Inbox",
            MenuSection::Preferences => "Preferences",
            MenuSection::Activity => "Activity",
        }
    }
}

pub struct App {
    pub current_section: MenuSection,
    pub selected_index: usize,
    pub status_message: String,
    pub show_help: bool,
    pub center: NotificationCenter,
    pub activity: ActivityLog,
    reporter: ErrorReporter,
    base_url: Url,
    test_kind: usize,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let api: Arc<dyn NotificationApi> = Arc::new(
            HttpNotificationApi::new(
                &config.api_base_url,
                config.api_token.clone(),
                config.request_timeout,
            )
            .context("Building API client")?,
        );
        let base_url = Url::parse(&config.api_base_url).context("Parsing api_base_url")?;

        let dispatcher = SideEffectDispatcher::new(
            Box::new(DesktopCapabilities::new(config.sound_file.clone())),
            config.enable_sound,
            config.enable_native_notifications,
        );
        let center = NotificationCenter::new(
            Arc::clone(&api),
            dispatcher,
            CenterOptions {
                poll_interval: config.poll_interval,
                max_toasts: config.max_toasts,
                hide_delay: config.hide_delay,
                auto_hide: config.auto_hide,
                auto_mark_as_read: config.auto_mark_as_read,
            },
        );
        let reporter = ErrorReporter::new(api, config.error_reporting);

        let mut app = Self {
            current_section: MenuSection::Inbox,
            selected_index: 0,
            status_message: format!("Connecting to {} ... Press '?' for help", config.api_base_url),
            show_help: false,
            center,
            activity: ActivityLog::new(),
            reporter,
            base_url,
            test_kind: 0,
        };
        app.reload().await;
        Ok(app)
    }

    pub fn next_item(&mut self) {
        let max = self.get_current_list_len();
        if max > 0 {
            self.selected_index = (self.selected_index + 1) % max;
        }
    }

    pub fn previous_item(&mut self) {
        let max = self.get_current_list_len();
        if max > 0 {
            self.selected_index = if self.selected_index == 0 { max - 1 } else { self.selected_index - 1 };
        }
    }

    pub fn go_home(&mut self) {
        self.selected_index = 0;
    }

    pub fn go_end(&mut self) {
        self.selected_index = self.get_current_list_len().saturating_sub(1);
    }

    pub fn set_section(&mut self, section: MenuSection) {
        if self.current_section != section {
            self.current_section = section;
            self.selected_index = 0;
        }
    }

    pub fn next_section(&mut self) {
        let i = MenuSection::ALL.iter().position(|s| *s == self.current_section).unwrap_or(0);
        self.set_section(MenuSection::ALL[(i + 1) % MenuSection::ALL.len()]);
    }

    pub fn previous_section(&mut self) {
        let i = MenuSection::ALL.iter().position(|s| *s == self.current_section).unwrap_or(0);
        let len = MenuSection::ALL.len();
        self.set_section(MenuSection::ALL[(i + len - 1) % len]);
    }

    fn get_current_list_len(&self) -> usize {
        match self.current_section {
            MenuSection::Inbox => self.center.cache.len(),
            MenuSection::Preferences => PreferenceToggle::ALL.len(),
            MenuSection::Activity => self.activity.items.len(),
        }
    }

    /// Full reload of list, unread count and preferences.
    pub async fn reload(&mut self) {
        self.center.start().await;
        if let Some(err) = self.center.error.clone() {
            self.report_error("Load failed", anyhow::anyhow!(err));
        } else {
            self.status_message = format!(
                "Loaded {} notifications, {} unread",
                self.center.cache.len(),
                self.center.cache.unread_count
            );
            self.activity.push("Loaded", self.status_message.clone(), Level::Info);
        }
        self.selected_index = self.selected_index.min(self.get_current_list_len().saturating_sub(1));
    }

    pub async fn activate_item(&mut self) -> Result<()> {
        match self.current_section {
            MenuSection::Inbox => self.open_selected().await,
            MenuSection::Preferences => {
                self.toggle_selected_preference().await;
                Ok(())
            }
            MenuSection::Activity => Ok(()),
        }
    }

    /// "View Details": opens the notification's action URL in the browser.
    pub async fn open_selected(&mut self) -> Result<()> {
        let Some(n) = self.center.cache.get(self.selected_index).cloned() else { return Ok(()) };
        let Some(link) = n.action_url.as_deref() else {
            self.status_message = format!("'{}' has no details link", n.title);
            return Ok(());
        };
        let url = self.base_url.join(link).with_context(|| format!("Resolving {link}"))?;
        open_url(url.as_str())?;
        self.status_message = format!("Opened: {}", url);
        self.center.opened(&n.id).await;
        self.surface_center_error("Mark read");
        Ok(())
    }

    pub async fn mark_selected_read(&mut self) {
        let Some(n) = self.center.cache.get(self.selected_index).cloned() else { return };
        if n.is_read {
            self.status_message = "Already read".to_string();
            return;
        }
        if self.center.mark_read(&n.id).await {
            self.status_message = format!("Marked read: {}", n.title);
        } else {
            self.surface_center_error("Mark read");
        }
    }

    pub async fn mark_all_read(&mut self) {
        if self.center.mark_all_read().await {
            self.status_message = "All notifications marked read".to_string();
            self.activity.push("Inbox", "Marked all as read", Level::Info);
        } else {
            self.surface_center_error("Mark all read");
        }
    }

    pub async fn toggle_selected_preference(&mut self) {
        let Some(toggle) = PreferenceToggle::ALL.get(self.selected_index).copied() else { return };
        let next = self.center.preferences.toggled(toggle);
        let state = if next.get(toggle) { "on" } else { "off" };
        if self.center.update_preferences(next).await {
            self.status_message = format!("{} turned {}", toggle.label(), state);
            self.activity.push("Preferences", self.status_message.clone(), Level::Info);
        } else {
            self.surface_center_error("Save preferences");
        }
    }

    pub async fn send_test_notification(&mut self) {
        let kind = NotificationType::ALL[self.test_kind % NotificationType::ALL.len()];
        self.test_kind += 1;
        if self.center.send_test(kind).await {
            self.status_message = format!("Requested a test {} notification", kind.as_str());
            self.center.poll_now();
        } else {
            self.surface_center_error("Test notification");
        }
    }

    pub fn poll_now(&mut self) {
        self.status_message = match self.center.poll_now() {
            TickOutcome::Skipped => "A poll is already running".to_string(),
            _ => "Checking for new notifications...".to_string(),
        };
    }

    pub fn pending_error_reports(&self) -> usize {
        self.reporter.queued()
    }

    pub fn clear_error(&mut self) {
        self.center.clear_error();
        self.status_message.clear();
    }

    pub fn dismiss_toast(&mut self) {
        self.center.toasts.dismiss_top(Instant::now());
    }

    pub fn dismiss_all_toasts(&mut self) {
        self.center.toasts.dismiss_all(Instant::now());
    }

    /// Timer work for one pass of the UI loop.
    pub fn auto_refresh(&mut self) {
        let now = Instant::now();
        if let Some(update) = self.center.tick(now) {
            self.record_arrivals(&update);
        }
        self.reporter.tick(now);
    }

    fn record_arrivals(&mut self, update: &PollUpdate) {
        if update.added.is_empty() {
            return;
        }
        for n in &update.added {
            let level = if n.priority.is_urgent() { Level::Warning } else { Level::Info };
            self.activity.push(n.title.clone(), n.message.clone(), level);
        }
        self.status_message = format!(
            "{} new notification(s), {} unread",
            update.added.len(),
            self.center.cache.unread_count
        );
        info!(added = update.added.len(), sound = update.dispatch.sound_played, native = update.dispatch.native_shown, "new notifications");
    }

    fn surface_center_error(&mut self, context: &str) {
        if let Some(err) = self.center.error.take() {
            self.report_error(context, anyhow::anyhow!(err));
        }
    }

    pub fn report_error(&mut self, context: &str, err: anyhow::Error) {
        let msg = format!("{}: {}", context, err);
        error!(%msg);
        self.status_message = msg.clone();
        self.reporter.record(context, &err.to_string());
        self.activity.push(context, msg, Level::Error);
    }
}

fn open_url(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    { Command::new("open").arg(url).spawn()?; }
    #[cfg(target_os = "linux")]
    { Command::new("xdg-open").arg(url).spawn()?; }
    #[cfg(target_os = "windows")]
    { Command::new("cmd").args(["/C", "start", "", url]).spawn()?; }
    Ok(())
}
