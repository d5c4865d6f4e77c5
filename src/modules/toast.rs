use std::cmp::Ordering;
use std::time::{Duration, Instant};

use crate::modules::notifications::{CACHE_LIMIT, Notification};

/// How long an exiting toast stays on screen before it is dropped.
pub const EXIT_WINDOW: Duration = Duration::from_millis(300);
/// Rows each stacked toast is shifted down by, per position in the stack.
pub const TOAST_STACK_STEP: u16 = 1;

fn rank(a: &Notification, b: &Notification) -> Ordering {
    b.priority
        .is_urgent()
        .cmp(&a.priority.is_urgent())
        .then_with(|| b.timestamp.cmp(&a.timestamp))
}

/// Orders toast candidates: urgent first, newest first within each group,
/// then keeps at most `max`.
pub fn select_toasts(candidates: &[Notification], max: usize) -> Vec<Notification> {
    let mut picked = candidates.to_vec();
    picked.sort_by(rank);
    picked.truncate(max);
    picked
}

pub fn stack_offset(index: usize) -> u16 {
    TOAST_STACK_STEP.saturating_mul(index as u16)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastPhase {
    Visible,
    Exiting { since: Instant },
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub notification: Notification,
    pub shown_at: Instant,
    pub phase: ToastPhase,
}

impl Toast {
    pub fn is_exiting(&self) -> bool {
        matches!(self.phase, ToastPhase::Exiting { .. })
    }
}

/// In-app toast stack.
///
/// Lifecycle per toast is `Visible -> Exiting -> removed`. Deadlines are
/// checked in [`ToastQueue::tick`], so nothing fires once the queue is gone.
pub struct ToastQueue {
    max_toasts: usize,
    hide_delay: Duration,
    auto_hide: bool,
    pending: Vec<Notification>,
    toasts: Vec<Toast>,
}

impl ToastQueue {
    pub fn new(max_toasts: usize, hide_delay: Duration) -> Self {
        Self { max_toasts, hide_delay, auto_hide: true, pending: Vec::new(), toasts: Vec::new() }
    }

    pub fn with_auto_hide(mut self, auto_hide: bool) -> Self {
        self.auto_hide = auto_hide;
        self
    }

    /// Adds arrivals to the candidate set and rebuilds the visible stack.
    pub fn push(&mut self, arrived: &[Notification], now: Instant) {
        for n in arrived {
            let queued = self.pending.iter().any(|p| p.id == n.id)
                || self.toasts.iter().any(|t| t.notification.id == n.id);
            if !queued {
                self.pending.push(n.clone());
            }
        }
        self.refill(now);
    }

    /// Shows the best `max_toasts` of everything not yet dismissed.
    ///
    /// Exiting toasts keep their slot until their window runs out. A visible
    /// toast outranked by a newer candidate goes back to `pending`.
    fn refill(&mut self, now: Instant) {
        let exiting = self.toasts.iter().filter(|t| t.is_exiting()).count();
        let slots = self.max_toasts.saturating_sub(exiting);

        let (mut shown, rest): (Vec<Toast>, Vec<Toast>) =
            self.toasts.drain(..).partition(|t| t.is_exiting());
        let mut candidates: Vec<Notification> = rest.iter().map(|t| t.notification.clone()).collect();
        candidates.append(&mut self.pending);

        let mut picked = select_toasts(&candidates, candidates.len());
        self.pending = picked.split_off(slots.min(picked.len()));
        self.pending.truncate(CACHE_LIMIT);

        shown.extend(picked.into_iter().map(|notification| {
            let shown_at = rest
                .iter()
                .find(|t| t.notification.id == notification.id)
                .map_or(now, |t| t.shown_at);
            Toast { notification, shown_at, phase: ToastPhase::Visible }
        }));
        shown.sort_by(|a, b| rank(&a.notification, &b.notification));
        self.toasts = shown;
    }

    /// Drops queued and visible toasts whose notification no longer passes `keep`.
    pub fn retain(&mut self, now: Instant, keep: impl Fn(&Notification) -> bool) {
        self.pending.retain(|n| keep(n));
        let gone: Vec<String> = self
            .toasts
            .iter()
            .filter(|t| !keep(&t.notification))
            .map(|t| t.notification.id.clone())
            .collect();
        for id in gone {
            self.dismiss(&id, now);
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Starts the exit of one toast. Toasts already exiting keep their window.
    pub fn dismiss(&mut self, id: &str, now: Instant) {
        if let Some(t) = self.toasts.iter_mut().find(|t| t.notification.id == id) {
            if !t.is_exiting() {
                t.phase = ToastPhase::Exiting { since: now };
            }
        }
    }

    pub fn dismiss_top(&mut self, now: Instant) {
        if let Some(id) = self
            .toasts
            .iter()
            .find(|t| !t.is_exiting())
            .map(|t| t.notification.id.clone())
        {
            self.dismiss(&id, now);
        }
    }

    pub fn dismiss_all(&mut self, now: Instant) {
        self.pending.clear();
        for t in &mut self.toasts {
            if !t.is_exiting() {
                t.phase = ToastPhase::Exiting { since: now };
            }
        }
    }

    /// Forgets a toast for a notification that was handled elsewhere.
    pub fn forget(&mut self, id: &str, now: Instant) {
        self.pending.retain(|p| p.id != id);
        self.dismiss(id, now);
    }

    /// Advances timers: expires visible toasts and drops those whose exit window passed.
    pub fn tick(&mut self, now: Instant) {
        let hide_delay = self.hide_delay;
        let auto_hide = self.auto_hide;
        for t in &mut self.toasts {
            if let ToastPhase::Visible = t.phase {
                let expired = now.duration_since(t.shown_at) >= hide_delay;
                if auto_hide && expired && !t.notification.priority.is_urgent() {
                    t.phase = ToastPhase::Exiting { since: now };
                }
            }
        }
        self.toasts.retain(|t| match t.phase {
            ToastPhase::Exiting { since } => now.duration_since(since) < EXIT_WINDOW,
            ToastPhase::Visible => true,
        });
        self.refill(now);
    }

    /// Toasts in stacking order: index 0 is on top.
    pub fn visible(&self) -> &[Toast] {
        &self.toasts
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::notifications::Priority;
    use crate::modules::notifications::tests::sample;
    use pretty_assertions::assert_eq;

    fn ids(toasts: &[Toast]) -> Vec<&str> {
        toasts.iter().map(|t| t.notification.id.as_str()).collect()
    }

    #[test]
    fn urgent_first_then_newest_truncated() {
        let candidates = vec![
            sample("old-low", Priority::Low, false, 1),
            sample("new-high", Priority::High, false, 50),
            sample("old-urgent", Priority::Urgent, false, 2),
            sample("mid-medium", Priority::Medium, false, 20),
            sample("new-urgent", Priority::Urgent, false, 40),
        ];
        let picked: Vec<_> = select_toasts(&candidates, 3).into_iter().map(|n| n.id).collect();
        assert_eq!(picked, vec!["new-urgent", "old-urgent", "new-high"]);
    }

    #[test]
    fn urgent_toast_outlives_any_hide_delay() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(3, Duration::from_millis(10));
        queue.push(
            &[sample("u", Priority::Urgent, false, 0), sample("l", Priority::Low, false, 1)],
            start,
        );

        queue.tick(start + Duration::from_millis(20));
        queue.tick(start + Duration::from_secs(3600));

        assert_eq!(ids(queue.visible()), vec!["u"]);
        assert_eq!(queue.visible()[0].phase, ToastPhase::Visible);
    }

    #[test]
    fn expiry_passes_through_exiting() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(3, Duration::from_secs(5));
        queue.push(&[sample("a", Priority::Medium, false, 0)], start);

        let expired_at = start + Duration::from_secs(5);
        queue.tick(expired_at);
        assert!(queue.visible()[0].is_exiting());

        queue.tick(expired_at + Duration::from_millis(299));
        assert_eq!(queue.visible().len(), 1);

        queue.tick(expired_at + EXIT_WINDOW);
        assert!(queue.is_empty());
    }

    #[test]
    fn dismiss_then_refill_from_pending() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(2, Duration::from_secs(5));
        queue.push(
            &[
                sample("1", Priority::Low, false, 1),
                sample("2", Priority::Low, false, 2),
                sample("3", Priority::Low, false, 3),
            ],
            start,
        );
        assert_eq!(ids(queue.visible()), vec!["3", "2"]);

        queue.dismiss_top(start);
        assert!(queue.visible()[0].is_exiting());
        queue.tick(start + EXIT_WINDOW);

        assert_eq!(ids(queue.visible()), vec!["2", "1"]);
    }

    #[test]
    fn urgent_dismissed_only_by_user() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(3, Duration::from_secs(1));
        queue.push(&[sample("u", Priority::Urgent, false, 0)], start);
        queue.dismiss("u", start + Duration::from_secs(10));
        queue.tick(start + Duration::from_secs(10) + EXIT_WINDOW);
        assert!(queue.is_empty());
    }

    #[test]
    fn auto_hide_off_keeps_everything() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(3, Duration::from_millis(1)).with_auto_hide(false);
        queue.push(&[sample("a", Priority::Low, false, 0)], start);
        queue.tick(start + Duration::from_secs(60));
        assert_eq!(queue.visible().len(), 1);
    }

    #[test]
    fn repeated_push_does_not_duplicate() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(3, Duration::from_secs(5));
        let a = sample("a", Priority::Low, false, 0);
        queue.push(&[a.clone()], start);
        queue.push(&[a], start);
        assert_eq!(queue.visible().len(), 1);
    }

    #[test]
    fn urgent_arrival_displaces_full_stack() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(3, Duration::from_secs(5));
        queue.push(
            &[
                sample("l1", Priority::Low, false, 1),
                sample("l2", Priority::Low, false, 2),
                sample("l3", Priority::Low, false, 3),
            ],
            start,
        );
        assert_eq!(ids(queue.visible()), vec!["l3", "l2", "l1"]);

        let later = start + Duration::from_secs(1);
        queue.push(&[sample("u", Priority::Urgent, false, 0)], later);
        queue.tick(later);

        assert_eq!(ids(queue.visible()), vec!["u", "l3", "l2"]);
        assert_eq!(queue.visible()[1].shown_at, start);
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn newer_arrival_outranks_older_visible() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(2, Duration::from_secs(5));
        queue.push(&[sample("a", Priority::High, false, 1), sample("b", Priority::High, false, 2)], start);
        queue.push(&[sample("c", Priority::Low, false, 9)], start);
        assert_eq!(ids(queue.visible()), vec!["c", "b"]);
    }

    #[test]
    fn pending_is_bounded_behind_sticky_urgents() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(3, Duration::from_millis(1));
        queue.push(
            &[
                sample("u1", Priority::Urgent, false, 1),
                sample("u2", Priority::Urgent, false, 2),
                sample("u3", Priority::Urgent, false, 3),
            ],
            start,
        );
        let lows: Vec<_> = (0..1000)
            .map(|i| sample(&format!("low-{i}"), Priority::Low, false, -i))
            .collect();
        queue.push(&lows, start);
        queue.tick(start + Duration::from_secs(60));

        assert_eq!(ids(queue.visible()), vec!["u3", "u2", "u1"]);
        assert_eq!(queue.pending_len(), CACHE_LIMIT);
    }

    #[test]
    fn retain_drops_pending_and_exits_visible() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(1, Duration::from_secs(5));
        queue.push(&[sample("a", Priority::Low, false, 2), sample("b", Priority::Low, false, 1)], start);

        queue.retain(start, |n| n.id != "a" && n.id != "b");

        assert!(queue.visible()[0].is_exiting());
        assert_eq!(queue.pending_len(), 0);
        queue.tick(start + EXIT_WINDOW);
        assert!(queue.is_empty());
    }

    #[test]
    fn stack_offsets_grow_with_index() {
        assert_eq!(stack_offset(0), 0);
        assert_eq!(stack_offset(2), 2 * TOAST_STACK_STEP);
    }
}
