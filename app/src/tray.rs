//! Tray menu rendering.
//!
//! The menu is a pure value derived from (credentials present?,
//! preference map). The presenter pushes rendered menus to the OS tray
//! host and discards renders that stem from superseded fetches, so the
//! visible menu always reflects the latest completed state change.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use beacon_client::{Credentials, PreferenceMap};

pub const LABEL_OPEN: &str = "Open App";
pub const LABEL_LOGIN: &str = "Please login";
pub const LABEL_NO_PREFERENCES: &str = "No notification preferences available";
pub const LABEL_QUIT: &str = "Quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    /// Opens / focuses the main window.
    Open,
    Separator,
    /// Disabled informational row.
    Notice(&'static str),
    /// Checkbox bound to one preference key; activating it runs the
    /// single-key toggle path.
    Toggle { key: String, checked: bool },
    Quit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuSpec {
    pub items: Vec<MenuItem>,
}

/// Render the tray menu for the given auth/preference state.
pub fn render(credentials: Option<&Credentials>, preferences: Option<&PreferenceMap>) -> MenuSpec {
    let mut items = vec![MenuItem::Open, MenuItem::Separator];

    match (credentials, preferences) {
        (None, _) => items.push(MenuItem::Notice(LABEL_LOGIN)),
        (Some(_), Some(preferences)) if !preferences.is_empty() => {
            for (key, enabled) in preferences {
                items.push(MenuItem::Toggle {
                    key: key.clone(),
                    checked: *enabled,
                });
            }
        }
        (Some(_), _) => items.push(MenuItem::Notice(LABEL_NO_PREFERENCES)),
    }

    items.push(MenuItem::Separator);
    items.push(MenuItem::Quit);
    MenuSpec { items }
}

/// OS tray primitive: atomically replace the visible menu.
pub trait TrayHost: Send + Sync {
    fn set_menu(&self, menu: &MenuSpec);
}

/// Pushes rendered menus to the tray host, newest completed state wins.
pub struct TrayPresenter {
    host: Arc<dyn TrayHost>,
    newest_seq: AtomicU64,
}

impl TrayPresenter {
    pub fn new(host: Arc<dyn TrayHost>) -> Self {
        Self {
            host,
            newest_seq: AtomicU64::new(0),
        }
    }

    /// Present the menu for a state change tagged `seq`.
    ///
    /// A render whose sequence number is older than the newest one
    /// already presented lost the race against a later fetch and is
    /// dropped. Returns whether the menu was shown.
    pub fn present(
        &self,
        seq: u64,
        credentials: Option<&Credentials>,
        preferences: Option<&PreferenceMap>,
    ) -> bool {
        loop {
            let newest = self.newest_seq.load(Ordering::SeqCst);
            if seq < newest {
                tracing::debug!(seq, newest, "discarding stale tray render");
                return false;
            }
            if self
                .newest_seq
                .compare_exchange(newest, seq, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        self.host.set_menu(&render(credentials, preferences));
        true
    }
}
