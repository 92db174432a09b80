//! App-facing event bus payloads.
//!
//! UI shells subscribe via [`crate::app::App::subscribe`] to learn when
//! server-held state changed; payloads carry the latest confirmed data.

use beacon_client::PreferenceMap;

pub const PREFERENCES_CHANGED: &str = "preferences_changed";

#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Fired after every successful reconcile; carries the confirmed map.
    PreferencesChanged(PreferenceMap),
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::PreferencesChanged(_) => PREFERENCES_CHANGED,
        }
    }
}
