use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::modules::notifications::{Notification, NotificationPreferences};

/// Mirrors the three states of a desktop notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

pub trait SoundSink: Send {
    fn play(&mut self) -> Result<()>;
}

/// Platform features the dispatcher checks at the moment it needs them.
pub trait Capabilities: Send {
    fn permission(&self) -> Permission;
    fn request_permission(&mut self) -> Permission;
    /// Shows a native notification. Repeated calls with the same `tag` replace
    /// the earlier one instead of stacking.
    fn show_native(&mut self, tag: &str, notification: &Notification) -> Result<()>;
    fn open_sound(&self) -> Result<Box<dyn SoundSink>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sound_played: bool,
    pub native_shown: usize,
}

pub struct SideEffectDispatcher {
    caps: Box<dyn Capabilities>,
    sound_requested: bool,
    native_requested: bool,
    sound: Option<Box<dyn SoundSink>>,
}

impl SideEffectDispatcher {
    pub fn new(caps: Box<dyn Capabilities>, sound_requested: bool, native_requested: bool) -> Self {
        Self { caps, sound_requested, native_requested, sound: None }
    }

    /// Asks for native notification permission, only while the user has not decided yet.
    pub fn setup(&mut self) {
        if self.native_requested && self.caps.permission() == Permission::Default {
            let granted = self.caps.request_permission();
            info!(?granted, "desktop notification permission requested");
        }
    }

    /// Fires sound and native notifications for a batch of newly arrived items.
    /// Items whose category is switched off are ignored.
    pub fn dispatch(
        &mut self,
        arrived: &[Notification],
        prefs: &NotificationPreferences,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let eligible: Vec<&Notification> =
            arrived.iter().filter(|n| prefs.allows(n.category())).collect();
        if eligible.is_empty() {
            return report;
        }

        if prefs.sound_enabled && self.sound_requested {
            report.sound_played = self.play_sound();
        }

        if prefs.browser_notifications
            && self.native_requested
            && self.caps.permission() == Permission::Granted
        {
            for n in eligible {
                match self.caps.show_native(&n.id, n) {
                    Ok(()) => report.native_shown += 1,
                    Err(e) => warn!(id = %n.id, error = %e, "native notification failed"),
                }
            }
        }
        report
    }

    fn play_sound(&mut self) -> bool {
        if self.sound.is_none() {
            match self.caps.open_sound() {
                Ok(sink) => self.sound = Some(sink),
                Err(e) => {
                    trace!(error = %e, "sound unavailable");
                    return false;
                }
            }
        }
        let Some(sink) = self.sound.as_mut() else { return false };
        match sink.play() {
            Ok(()) => true,
            Err(e) => {
                trace!(error = %e, "sound playback failed");
                false
            }
        }
    }
}

/// Maps a server id onto the numeric id notification daemons use for replacement.
fn native_id(tag: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    tag.hash(&mut hasher);
    // zero means "allocate a new one" to the daemon
    (hasher.finish() as u32).max(1)
}

pub struct DesktopCapabilities {
    permission: Permission,
    sound_file: Option<PathBuf>,
}

impl DesktopCapabilities {
    pub fn new(sound_file: Option<PathBuf>) -> Self {
        Self { permission: Permission::Default, sound_file }
    }
}

impl Capabilities for DesktopCapabilities {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Permission {
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            self.permission = match notify_rust::get_server_information() {
                Ok(info) => {
                    debug!(server = %info.name, "notification daemon found");
                    Permission::Granted
                }
                Err(e) => {
                    debug!(error = %e, "no notification daemon");
                    Permission::Denied
                }
            };
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        {
            self.permission = Permission::Granted;
        }
        self.permission
    }

    fn show_native(&mut self, tag: &str, notification: &Notification) -> Result<()> {
        let mut native = notify_rust::Notification::new();
        native
            .appname("notifdesk")
            .summary(&notification.title)
            .body(&notification.message);
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            native.id(native_id(tag));
            if notification.priority.is_urgent() {
                native.urgency(notify_rust::Urgency::Critical);
            }
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        let _ = tag;
        native.show().context("showing desktop notification")?;
        Ok(())
    }

    fn open_sound(&self) -> Result<Box<dyn SoundSink>> {
        let player = self.sound_file.as_ref().and_then(|file| {
            ["paplay", "aplay", "afplay"]
                .iter()
                .find_map(|p| which::which(p).ok())
                .map(|bin| (bin, file.clone()))
        });
        Ok(match player {
            Some((bin, file)) => Box::new(SoundCue::Player { bin, file }),
            None => Box::new(SoundCue::Bell),
        })
    }
}

/// The audio resource behind the "new notification" chime.
pub enum SoundCue {
    Player { bin: PathBuf, file: PathBuf },
    Bell,
}

/// Starts `bin file` and waits for it on a background task so the child is reaped.
fn spawn_player(bin: &Path, file: &Path) -> Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = Command::new(bin)
        .arg(file)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("spawning {:?}", bin))?;
    Ok(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                trace!(error = %e, "waiting for sound player");
                None
            }
        }
    }))
}

impl SoundSink for SoundCue {
    fn play(&mut self) -> Result<()> {
        match &*self {
            SoundCue::Player { bin, file } => {
                spawn_player(bin, file)?;
            }
            SoundCue::Bell => {
                let mut out = std::io::stdout();
                out.write_all(b"\x07")?;
                out.flush()?;
            }
        }
        Ok(())
    }
}
