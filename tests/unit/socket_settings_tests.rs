use std::time::Duration;

use dsp_courier::channel::socket::{next_backoff, SocketSettings};
use dsp_courier::config::GlobalConfig;

#[test]
fn backoff_doubles_up_to_ceiling() {
    let max = Duration::from_secs(30);
    let mut delay = Duration::from_secs(1);
    let mut seen = Vec::new();
    for _ in 0..7 {
        seen.push(delay.as_secs());
        delay = next_backoff(delay, max);
    }
    assert_eq!(seen, [1, 2, 4, 8, 16, 30, 30]);
}

#[test]
fn backoff_never_overflows() {
    let max = Duration::MAX;
    assert_eq!(next_backoff(Duration::MAX, max), Duration::MAX);
}

#[test]
fn settings_follow_channel_config() {
    let config = GlobalConfig::from_toml_str(
        r#"
[backend]
base_url = "http://localhost:8080"
socket_url = "ws://localhost:8081"

[channel]
initial_backoff_ms = 250
max_backoff_ms = 2000
queue_capacity = 4
"#,
    )
    .expect("config parses");

    let settings = SocketSettings::from_config(&config.backend.socket_url, "driver-7", &config.channel);
    assert_eq!(settings.url, "ws://localhost:8081");
    assert_eq!(settings.driver_id, "driver-7");
    assert_eq!(settings.initial_backoff, Duration::from_millis(250));
    assert_eq!(settings.max_backoff, Duration::from_secs(2));
    assert_eq!(settings.queue_capacity, 4);
}
