//! Inbound event dispatch.
//!
//! Turns a channel event into an OS notification with a click-to-focus
//! action. Failures never cross this boundary: a notification that
//! cannot be shown is logged and dropped.

use std::sync::Arc;

use beacon_client::pubsub::ChannelEvent;
use serde_json::Value;

use crate::channels;

/// Fallback notification title.
pub const APP_NAME: &str = "Beacon";
/// Fallback notification body.
pub const FALLBACK_BODY: &str = "You have a new notification";

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// OS notification primitive.
pub trait Notifier: Send + Sync {
    /// Show a notification. `on_click` is invoked if the platform
    /// reports the notification was activated.
    fn show(
        &self,
        title: &str,
        body: &str,
        on_click: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<(), NotifyError>;
}

/// Brings the main application window to the foreground.
pub trait WindowHandle: Send + Sync {
    fn focus(&self);
}

/// Routes inbound channel events to the OS notification primitive.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    window: Arc<dyn WindowHandle>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, window: Arc<dyn WindowHandle>) -> Self {
        Self { notifier, window }
    }

    /// Handle one inbound event. Never panics past this boundary.
    pub fn dispatch(&self, event: &ChannelEvent) {
        let Some(key) = channels::key_from_channel(&event.channel) else {
            tracing::debug!(channel = %event.channel, "event on unmapped channel ignored");
            return;
        };
        if event.event != channels::event_name(key) {
            tracing::debug!(channel = %event.channel, event = %event.event,
                "unexpected event name ignored");
            return;
        }

        let title = event
            .payload
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(APP_NAME);
        let body = event
            .payload
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_BODY);

        tracing::debug!(key, title, "showing notification");

        let window = Arc::clone(&self.window);
        if let Err(e) = self
            .notifier
            .show(title, body, Box::new(move || window.focus()))
        {
            tracing::warn!(key, error = %e, "failed to show notification");
        }
    }
}

/// Notifier backed by the OS notification service.
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    #[cfg(all(unix, not(target_os = "macos")))]
    fn show(
        &self,
        title: &str,
        body: &str,
        on_click: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<(), NotifyError> {
        let handle = notify_rust::Notification::new()
            .appname(APP_NAME)
            .summary(title)
            .body(body)
            .action("default", "Open")
            .show()
            .map_err(|e| NotifyError(e.to_string()))?;

        // Action delivery blocks, so it runs off the async runtime.
        std::thread::spawn(move || {
            let mut on_click = Some(on_click);
            handle.wait_for_action(|action| {
                if action == "default" {
                    if let Some(cb) = on_click.take() {
                        cb();
                    }
                }
            });
        });
        Ok(())
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    fn show(
        &self,
        title: &str,
        body: &str,
        on_click: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<(), NotifyError> {
        // Click actions need a shell integration on this platform.
        let _ = on_click;
        notify_rust::Notification::new()
            .appname(APP_NAME)
            .summary(title)
            .body(body)
            .show()
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(())
    }
}
