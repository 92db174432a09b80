//! Channel naming for notification categories.
//!
//! A preference key maps to exactly one pub/sub channel and one event
//! name: `notifications.<key>` / `<key>.notification`.

const CHANNEL_PREFIX: &str = "notifications.";
const EVENT_SUFFIX: &str = ".notification";

/// Channel carrying notifications for one category.
pub fn channel_name(key: &str) -> String {
    format!("{CHANNEL_PREFIX}{key}")
}

/// Event name published on a category's channel.
pub fn event_name(key: &str) -> String {
    format!("{key}{EVENT_SUFFIX}")
}

/// Inverse of [`channel_name`], used when routing inbound events back to
/// their category.
pub fn key_from_channel(channel: &str) -> Option<&str> {
    channel
        .strip_prefix(CHANNEL_PREFIX)
        .filter(|key| !key.is_empty())
}
