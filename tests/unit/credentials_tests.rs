//! Unit tests for credential persistence and the maps key lookup.
//!
//! The env-var tests mutate process-global state and run serially.

use dsp_courier::config::GlobalConfig;
use dsp_courier::credentials::{CredentialStore, Credentials, MemoryStore};

fn config() -> GlobalConfig {
    GlobalConfig::from_toml_str(
        r#"
[backend]
base_url = "http://localhost:8080"
socket_url = "ws://localhost:8081"
"#,
    )
    .expect("config parses")
}

fn credentials() -> Credentials {
    Credentials {
        token: "tok-123".into(),
        user_id: "driver-7".into(),
    }
}

#[test]
fn memory_store_starts_empty() {
    let store = MemoryStore::new();
    assert_eq!(store.load().expect("load"), None);
}

#[test]
fn memory_store_saves_and_replaces() {
    let store = MemoryStore::new();
    store.save(&credentials()).expect("save");
    assert_eq!(store.load().expect("load"), Some(credentials()));

    let rotated = Credentials {
        token: "tok-456".into(),
        ..credentials()
    };
    store.save(&rotated).expect("save");
    assert_eq!(store.load().expect("load"), Some(rotated));
}

#[test]
fn clearing_is_idempotent() {
    let store = MemoryStore::new();
    store.clear().expect("clear empty");
    store.save(&credentials()).expect("save");
    store.clear().expect("clear");
    store.clear().expect("clear again");
    assert_eq!(store.load().expect("load"), None);
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn maps_key_falls_back_to_env() {
    let mut config = config();
    unsafe {
        std::env::set_var("DSP_MAPS_API_KEY", "maps-test-key");
    }

    config.load_credentials().await;
    assert_eq!(config.maps.api_key, "maps-test-key");

    unsafe {
        std::env::remove_var("DSP_MAPS_API_KEY");
    }
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn missing_maps_key_is_not_fatal() {
    let mut config = config();
    unsafe {
        std::env::remove_var("DSP_MAPS_API_KEY");
    }

    config.load_credentials().await;
    assert!(config.maps.api_key.is_empty());
}
