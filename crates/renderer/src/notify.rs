use std::time::{Duration, Instant};

use crate::types::RendererOptions;
use crate::validate::ValidationStage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Success,
    Error,
}

/// What a notification is about; part of the dedup key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    ShaderCompiled,
    Shader(ValidationStage),
    Texture,
    Config,
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub severity: Severity,
    pub message: String,
}

impl Notification {
    pub fn success(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Success,
            message: message.into(),
        }
    }

    pub fn error(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

struct Alert {
    notification: Notification,
    expires_at: Instant,
}

/// One visible alert at a time, auto-hidden after a severity-dependent delay.
///
/// Posting the same kind and message as the previous post is ignored, so a
/// shader that stays broken does not restart its alert every frame.
pub struct Notifier {
    success_ttl: Duration,
    error_ttl: Duration,
    alert: Option<Alert>,
    last_key: Option<(NotificationKind, String)>,
    shown: u64,
}

impl Notifier {
    pub fn new(options: &RendererOptions) -> Self {
        Self {
            success_ttl: options.success_ttl,
            error_ttl: options.error_ttl,
            alert: None,
            last_key: None,
            shown: 0,
        }
    }

    /// Returns true when a fresh alert was started.
    pub fn post(&mut self, notification: Notification, now: Instant) -> bool {
        let key = (notification.kind, notification.message.clone());
        if self.last_key.as_ref() == Some(&key) {
            return false;
        }
        let ttl = match notification.severity {
            Severity::Success => self.success_ttl,
            Severity::Error => self.error_ttl,
        };
        match notification.severity {
            Severity::Success => tracing::info!(message = %notification.message, "notification"),
            Severity::Error => tracing::warn!(message = %notification.message, "notification"),
        }
        self.last_key = Some(key);
        self.alert = Some(Alert {
            notification,
            expires_at: now + ttl,
        });
        self.shown += 1;
        true
    }

    /// Forgets the dedup key so the next post always shows.
    pub fn reset(&mut self) {
        self.last_key = None;
    }

    /// The alert visible at `now`, if any.
    pub fn visible(&self, now: Instant) -> Option<&Notification> {
        self.alert
            .as_ref()
            .filter(|alert| now < alert.expires_at)
            .map(|alert| &alert.notification)
    }

    /// Drops an expired alert.
    pub fn tick(&mut self, now: Instant) {
        if self
            .alert
            .as_ref()
            .is_some_and(|alert| now >= alert.expires_at)
        {
            self.alert = None;
        }
    }

    /// Number of alert lifecycles started so far.
    pub fn shown(&self) -> u64 {
        self.shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> Notifier {
        Notifier::new(&RendererOptions::default())
    }

    #[test]
    fn identical_errors_share_one_lifecycle() {
        let mut notifier = notifier();
        let start = Instant::now();
        let error = Notification::error(
            NotificationKind::Shader(ValidationStage::Fragment),
            "Line 3: syntax error",
        );
        assert!(notifier.post(error.clone(), start));
        assert!(!notifier.post(error.clone(), start + Duration::from_secs(5)));
        assert_eq!(notifier.shown(), 1);
        assert!(notifier.visible(start + Duration::from_secs(9)).is_some());
        assert!(notifier.visible(start + Duration::from_secs(10)).is_none());
    }

    #[test]
    fn success_hides_after_three_seconds() {
        let mut notifier = notifier();
        let start = Instant::now();
        notifier.post(
            Notification::success(NotificationKind::ShaderCompiled, "Shader compiled"),
            start,
        );
        assert!(notifier.visible(start + Duration::from_millis(2999)).is_some());
        notifier.tick(start + Duration::from_secs(3));
        assert!(notifier.visible(start + Duration::from_secs(3)).is_none());
    }

    #[test]
    fn different_message_restarts_alert() {
        let mut notifier = notifier();
        let start = Instant::now();
        let kind = NotificationKind::Shader(ValidationStage::Vertex);
        notifier.post(Notification::error(kind, "Line 1: a"), start);
        assert!(notifier.post(Notification::error(kind, "Line 2: b"), start));
        assert_eq!(
            notifier.visible(start).map(|n| n.message.as_str()),
            Some("Line 2: b")
        );
        assert_eq!(notifier.shown(), 2);
    }

    #[test]
    fn error_after_success_shows_again() {
        let mut notifier = notifier();
        let start = Instant::now();
        let error = Notification::error(NotificationKind::Texture, "decode failed");
        notifier.post(error.clone(), start);
        notifier.post(
            Notification::success(NotificationKind::ShaderCompiled, "ok"),
            start,
        );
        assert!(notifier.post(error, start));
    }
}
