use anyhow::{Context, Result};

pub const BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar API resources and the methods this provider calls on them.
pub mod api {
    pub const CALENDARS: &str = "calendars";
    pub const CHANNELS: &str = "channels";
    pub const EVENTS: &str = "events";

    pub const STOP: &str = "stop";
    pub const WATCH: &str = "watch";
}

/// Channel type for `events.watch`.
pub const CHANNEL_TYPE: &str = "web_hook";

/// Page size for `events.list`.
pub const MAX_RESULTS: u32 = 250;

/// Header carrying the channel a notification was sent on.
pub const CHANNEL_ID_HEADER: &str = "x-goog-channel-id";

/// Header carrying the notification kind (`sync`, `exists`, `not_exists`).
pub const RESOURCE_STATE_HEADER: &str = "x-goog-resource-state";

/// Resource state of the handshake message sent right after `events.watch`.
pub const SYNC_STATE: &str = "sync";

/// Google Calendar configuration.
///
/// Loads the OAuth access token from `GOOGLE_CALENDAR_ACCESS_TOKEN`.
/// `GOOGLE_CALENDAR_API_URL` overrides the API base URL.
#[derive(Debug)]
pub struct GoogleCalendarConfig {
    pub access_token: String,
    pub base_url: String,
}

impl GoogleCalendarConfig {
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("GOOGLE_CALENDAR_ACCESS_TOKEN")
            .context("GOOGLE_CALENDAR_ACCESS_TOKEN not set")?;
        let base_url =
            std::env::var("GOOGLE_CALENDAR_API_URL").unwrap_or_else(|_| BASE_URL.to_string());
        Ok(Self {
            access_token,
            base_url,
        })
    }
}
