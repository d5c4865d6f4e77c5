use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Upper bound on cached notifications, newest first.
pub const CACHE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    FormSubmission,
    ContentPublished,
    Reminder,
    System,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [
        NotificationType::FormSubmission,
        NotificationType::ContentPublished,
        NotificationType::Reminder,
        NotificationType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::FormSubmission => "form_submission",
            NotificationType::ContentPublished => "content_published",
            NotificationType::Reminder => "reminder",
            NotificationType::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn is_urgent(&self) -> bool {
        matches!(self, Priority::Urgent)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "URGENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

impl Notification {
    /// Preference category that gates side effects for this notification.
    /// Urgent items are governed by the urgent-inquiries switch regardless of type.
    pub fn category(&self) -> Category {
        if self.priority.is_urgent() {
            return Category::UrgentInquiries;
        }
        match self.kind {
            NotificationType::FormSubmission => Category::FormSubmissions,
            NotificationType::ContentPublished | NotificationType::Reminder => {
                Category::ContentReminders
            }
            NotificationType::System => Category::SystemUpdates,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    FormSubmissions,
    UrgentInquiries,
    ContentReminders,
    SystemUpdates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPreferences {
    pub form_submissions: bool,
    pub urgent_inquiries: bool,
    pub content_reminders: bool,
    pub system_updates: bool,
}

impl Default for CategoryPreferences {
    fn default() -> Self {
        Self {
            form_submissions: true,
            urgent_inquiries: true,
            content_reminders: true,
            system_updates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub email_notifications: bool,
    pub browser_notifications: bool,
    pub sound_enabled: bool,
    pub categories: CategoryPreferences,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email_notifications: true,
            browser_notifications: true,
            sound_enabled: true,
            categories: CategoryPreferences::default(),
        }
    }
}

/// One editable switch of the preferences screen, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceToggle {
    Email,
    Native,
    Sound,
    Category(Category),
}

impl PreferenceToggle {
    pub const ALL: [PreferenceToggle; 7] = [
        PreferenceToggle::Email,
        PreferenceToggle::Native,
        PreferenceToggle::Sound,
        PreferenceToggle::Category(Category::FormSubmissions),
        PreferenceToggle::Category(Category::UrgentInquiries),
        PreferenceToggle::Category(Category::ContentReminders),
        PreferenceToggle::Category(Category::SystemUpdates),
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PreferenceToggle::Email => "Email notifications",
            PreferenceToggle::Native => "Desktop notifications",
            PreferenceToggle::Sound => "Sound",
            PreferenceToggle::Category(Category::FormSubmissions) => "Form submissions",
            PreferenceToggle::Category(Category::UrgentInquiries) => "Urgent inquiries",
            PreferenceToggle::Category(Category::ContentReminders) => "Content reminders",
            PreferenceToggle::Category(Category::SystemUpdates) => "System updates",
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, category: Category) -> bool {
        match category {
            Category::FormSubmissions => self.categories.form_submissions,
            Category::UrgentInquiries => self.categories.urgent_inquiries,
            Category::ContentReminders => self.categories.content_reminders,
            Category::SystemUpdates => self.categories.system_updates,
        }
    }

    pub fn get(&self, toggle: PreferenceToggle) -> bool {
        match toggle {
            PreferenceToggle::Email => self.email_notifications,
            PreferenceToggle::Native => self.browser_notifications,
            PreferenceToggle::Sound => self.sound_enabled,
            PreferenceToggle::Category(c) => self.allows(c),
        }
    }

    /// Returns a copy with one switch flipped. The stored value is only
    /// replaced once the server accepts the copy.
    pub fn toggled(&self, toggle: PreferenceToggle) -> Self {
        let mut next = self.clone();
        match toggle {
            PreferenceToggle::Email => next.email_notifications = !next.email_notifications,
            PreferenceToggle::Native => next.browser_notifications = !next.browser_notifications,
            PreferenceToggle::Sound => next.sound_enabled = !next.sound_enabled,
            PreferenceToggle::Category(Category::FormSubmissions) => {
                next.categories.form_submissions = !next.categories.form_submissions
            }
            PreferenceToggle::Category(Category::UrgentInquiries) => {
                next.categories.urgent_inquiries = !next.categories.urgent_inquiries
            }
            PreferenceToggle::Category(Category::ContentReminders) => {
                next.categories.content_reminders = !next.categories.content_reminders
            }
            PreferenceToggle::Category(Category::SystemUpdates) => {
                next.categories.system_updates = !next.categories.system_updates
            }
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub merged: Vec<Notification>,
    /// Items from the incoming batch that were not already cached.
    pub added: Vec<Notification>,
    pub new_unread: usize,
}

/// Merges a poll batch into the cached list.
///
/// Incoming items whose id is already cached are dropped, the cached copy keeps
/// its position. New items are placed ahead of the existing list in the order
/// they arrived and the result is cut to [`CACHE_LIMIT`].
pub fn merge_notifications(existing: &[Notification], incoming: &[Notification]) -> MergeOutcome {
    let mut seen: HashSet<&str> = existing.iter().map(|n| n.id.as_str()).collect();
    let mut added = Vec::new();
    for n in incoming {
        if seen.insert(n.id.as_str()) {
            added.push(n.clone());
        }
    }
    let new_unread = added.iter().filter(|n| !n.is_read).count();

    let mut merged = Vec::with_capacity(CACHE_LIMIT.min(added.len() + existing.len()));
    merged.extend(added.iter().cloned());
    merged.extend(existing.iter().cloned());
    merged.truncate(CACHE_LIMIT);

    MergeOutcome { merged, added, new_unread }
}

#[derive(Debug, Default)]
pub struct NotificationCache {
    pub items: Vec<Notification>,
    pub unread_count: usize,
}

impl NotificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list with a freshly loaded page.
    pub fn replace(&mut self, mut items: Vec<Notification>) {
        items.truncate(CACHE_LIMIT);
        self.items = items;
    }

    pub fn set_unread_count(&mut self, count: usize) {
        self.unread_count = count;
    }

    /// Merges a batch and bumps the unread counter by the new unread items only.
    /// Returns the items that were actually added.
    pub fn apply(&mut self, incoming: &[Notification]) -> Vec<Notification> {
        let outcome = merge_notifications(&self.items, incoming);
        self.items = outcome.merged;
        self.unread_count += outcome.new_unread;
        outcome.added
    }

    pub fn get(&self, index: usize) -> Option<&Notification> {
        self.items.get(index)
    }

    pub fn mark_read(&mut self, id: &str) {
        if let Some(n) = self.items.iter_mut().find(|n| n.id == id) {
            if !n.is_read {
                n.is_read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
            }
        }
    }

    pub fn mark_all_read(&mut self) {
        for n in &mut self.items {
            n.is_read = true;
        }
        self.unread_count = 0;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    pub(crate) fn sample(id: &str, priority: Priority, is_read: bool, secs: i64) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationType::FormSubmission,
            title: format!("New inquiry {id}"),
            message: "A customer submitted the contact form".to_string(),
            priority,
            is_read,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            action_url: None,
        }
    }

    fn ids(list: &[Notification]) -> Vec<&str> {
        list.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn duplicate_id_keeps_cached_copy_in_place() {
        let a = sample("1", Priority::Low, true, 0);
        let b = sample("2", Priority::Low, false, 1);
        let c = sample("3", Priority::Medium, false, 3);
        let d = sample("1", Priority::High, false, 4);

        let mut cache = NotificationCache::new();
        cache.replace(vec![a.clone(), b]);
        cache.set_unread_count(1);

        let added = cache.apply(&[c, d]);

        assert_eq!(ids(&cache.items), vec!["3", "1", "2"]);
        assert_eq!(cache.items[1], a);
        assert_eq!(cache.unread_count, 2);
        assert_eq!(ids(&added), vec!["3"]);
    }

    #[test]
    fn merge_never_exceeds_limit_or_duplicates() {
        let existing: Vec<_> = (0..CACHE_LIMIT)
            .map(|i| sample(&format!("old-{i}"), Priority::Low, false, i as i64))
            .collect();
        let mut incoming: Vec<_> = (0..10)
            .map(|i| sample(&format!("new-{i}"), Priority::Low, false, 100 + i as i64))
            .collect();
        incoming.push(sample("old-3", Priority::Low, false, 200));
        incoming.push(sample("new-1", Priority::Low, false, 201));

        let outcome = merge_notifications(&existing, &incoming);

        assert_eq!(outcome.merged.len(), CACHE_LIMIT);
        let unique: HashSet<_> = outcome.merged.iter().map(|n| n.id.clone()).collect();
        assert_eq!(unique.len(), outcome.merged.len());
        assert_eq!(outcome.merged[0].id, "new-0");
        assert_eq!(outcome.new_unread, 10);
    }

    #[test]
    fn read_arrivals_do_not_bump_unread() {
        let mut cache = NotificationCache::new();
        cache.apply(&[sample("1", Priority::Low, true, 0), sample("2", Priority::Low, false, 1)]);
        assert_eq!(cache.unread_count, 1);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut cache = NotificationCache::new();
        cache.apply(&[sample("1", Priority::Low, false, 0)]);
        cache.mark_read("1");
        cache.mark_read("1");
        cache.mark_read("missing");
        assert_eq!(cache.unread_count, 0);
        assert!(cache.items[0].is_read);
    }

    #[test]
    fn urgent_priority_routes_to_urgent_category() {
        let mut n = sample("1", Priority::Urgent, false, 0);
        n.kind = NotificationType::System;
        assert_eq!(n.category(), Category::UrgentInquiries);
        n.priority = Priority::High;
        assert_eq!(n.category(), Category::SystemUpdates);
    }

    #[test]
    fn toggled_flips_only_one_switch() {
        let prefs = NotificationPreferences::default();
        let next = prefs.toggled(PreferenceToggle::Category(Category::SystemUpdates));
        assert!(!next.categories.system_updates);
        assert!(next.sound_enabled);
        assert!(prefs.categories.system_updates);
    }

    #[test]
    fn deserializes_server_payload() {
        let json = r#"{
            "id": "ckx1",
            "type": "content_published",
            "title": "Blog post published",
            "message": "Winter HVAC checklist is live",
            "priority": "medium",
            "isRead": false,
            "timestamp": "2024-11-02T09:15:00.000Z",
            "actionUrl": "/admin/blog/ckx1"
        }"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.kind, NotificationType::ContentPublished);
        assert_eq!(n.action_url.as_deref(), Some("/admin/blog/ckx1"));
        assert_eq!(n.category(), Category::ContentReminders);
    }
}
