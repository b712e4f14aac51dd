use super::PulseConfig;
use std::path::PathBuf;

/// Overrides file/default values with `PULSE_*` environment variables.
///
/// Unparseable values are ignored and the existing value is kept.
pub fn apply_env_overrides(config: &mut PulseConfig) {
    if let Ok(v) = std::env::var("PULSE_PROVIDER_TIMEOUT_SECS") {
        if let Ok(n) = v.parse::<u64>() {
            config.engine.provider_timeout_secs = n;
        }
    }
    if let Ok(v) = std::env::var("PULSE_RENEWAL_CHECK_INTERVAL_SECS") {
        if let Ok(n) = v.parse::<u64>() {
            config.subscription.renewal_check_interval_secs = n;
        }
    }
    if let Ok(v) = std::env::var("PULSE_STATE_DB") {
        config.state.path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PULSE_API_PORT") {
        if let Ok(n) = v.parse::<u16>() {
            config.api.port = n;
        }
    }
    if let Ok(v) = std::env::var("PULSE_PUBLIC_URL") {
        config.api.public_url = v;
    }
    if let Ok(v) = std::env::var("PULSE_SINK_URL") {
        config.sink.url = Some(v);
    }
    if let Ok(v) = std::env::var("PULSE_SINK_TOKEN") {
        config.sink.token = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-var-mutating tests; the process env is shared.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("PULSE_API_PORT", "4100");
        std::env::set_var("PULSE_SINK_URL", "http://sink.local/events");
        std::env::set_var("PULSE_PROVIDER_TIMEOUT_SECS", "not-a-number");

        let mut config = PulseConfig::default();
        apply_env_overrides(&mut config);

        assert_eq!(config.api.port, 4100);
        assert_eq!(config.sink.url.as_deref(), Some("http://sink.local/events"));
        assert_eq!(config.engine.provider_timeout_secs, 30);

        std::env::remove_var("PULSE_API_PORT");
        std::env::remove_var("PULSE_SINK_URL");
        std::env::remove_var("PULSE_PROVIDER_TIMEOUT_SECS");
    }
}
