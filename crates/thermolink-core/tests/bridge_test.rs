#![allow(clippy::unwrap_used)]
// End-to-end bridge tests against a mock service: materialization from
// the bulk list, the debounced write path, merge precedence of the
// echoed response, and the trailing reconcile pull.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use thermolink_api::{CredentialStore, MemoryCredentialStore, StoredToken};
use thermolink_core::{Bridge, BridgeConfig, CapabilityValue, CoreError, DeviceTuning};

fn fast_tuning() -> DeviceTuning {
    DeviceTuning {
        debounce: TimeDelta::milliseconds(50),
        settle: TimeDelta::milliseconds(100),
    }
}

async fn bridge_against(server: &MockServer) -> Bridge {
    let store = MemoryCredentialStore::with_credentials("user@example.com", "hunter2");
    store.save_token(&StoredToken {
        context_key: "ctx".to_owned(),
        expiry: Utc::now() + TimeDelta::days(10),
    });
    let config = BridgeConfig {
        base_url: Url::parse(&server.uri()).unwrap(),
        poll_interval: TimeDelta::hours(1),
        tuning: fast_tuning(),
        timeout: Duration::from_secs(5),
    };
    Bridge::new(config, Arc::new(store)).unwrap()
}

fn list_body(set_temperature: f64, energy_meter: bool) -> serde_json::Value {
    json!([{
        "ID": 100,
        "Name": "Home",
        "Structure": {
            "Devices": [{
                "DeviceID": 55,
                "DeviceName": "Living room",
                "BuildingID": 100,
                "Type": 0,
                "Device": {
                    "Power": true,
                    "SetTemperature": set_temperature,
                    "RoomTemperature": 21.5,
                    "WifiSignalStrength": -60,
                    "HasEnergyConsumedMeter": energy_meter
                }
            }]
        }
    }])
}

#[tokio::test]
async fn write_debounce_push_echo_and_trailing_pull() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/User/ListDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(20.0, false)))
        .mount(&server)
        .await;

    // The push must carry the full object, with only the changed field
    // flagged (target temperature = 0x4).
    Mock::given(method("POST"))
        .and(path("/Device/SetAta"))
        .and(body_partial_json(json!({
            "DeviceID": 55,
            "EffectiveFlags": 4,
            "Power": true,
            "SetTemperature": 21.0,
            "HasPendingCommand": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Power": true,
            "SetTemperature": 21.0,
            "RoomTemperature": 22.0,
            "EffectiveFlags": 4
        })))
        .expect(1)
        .mount(&server)
        .await;

    // The trailing reconcile pull: direct fields here are stale and must
    // not clobber the merged state; list-only fields land.
    Mock::given(method("GET"))
        .and(path("/Device/Get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "SetTemperature": 19.0,
            "WifiSignalStrength": -55
        })))
        .expect(1)
        .mount(&server)
        .await;

    let bridge = bridge_against(&server).await;
    bridge.start().await.unwrap();

    let device = bridge.device(55).unwrap();
    assert_eq!(
        device.capability_value("target_temperature").await,
        Some(CapabilityValue::Number(20.0))
    );
    assert_eq!(
        device.capability_value("measure_signal_strength").await,
        Some(CapabilityValue::Number(-60.0))
    );

    device
        .set_capability("target_temperature", CapabilityValue::Number(21.0))
        .await
        .unwrap();

    // Debounce (50ms) + settle (100ms) with slack.
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(
        device.capability_value("target_temperature").await,
        Some(CapabilityValue::Number(21.0)),
        "echo merged, stale trailing value ignored"
    );
    assert_eq!(
        device.capability_value("measure_temperature").await,
        Some(CapabilityValue::Number(22.0)),
        "read-only field accepted from the push echo"
    );
    assert_eq!(
        device.capability_value("measure_signal_strength").await,
        Some(CapabilityValue::Number(-55.0)),
        "list-only field accepted from the trailing pull"
    );
    assert!(!device.has_pending().await);

    bridge.shutdown();
}

#[tokio::test]
async fn rapid_writes_collapse_into_one_push() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/User/ListDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(20.0, false)))
        .mount(&server)
        .await;

    // Exactly one push, carrying the last write of the burst.
    Mock::given(method("POST"))
        .and(path("/Device/SetAta"))
        .and(body_partial_json(json!({ "SetTemperature": 24.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Power": true,
            "SetTemperature": 24.0,
            "EffectiveFlags": 4
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Device/Get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let bridge = bridge_against(&server).await;
    bridge.start().await.unwrap();
    let device = bridge.device(55).unwrap();

    for temperature in [22.0, 23.0, 24.0] {
        device
            .set_capability("target_temperature", CapabilityValue::Number(temperature))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        device.capability_value("target_temperature").await,
        Some(CapabilityValue::Number(24.0))
    );

    bridge.shutdown();
}

#[tokio::test]
async fn energy_meter_toggle_rebuilds_capabilities() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/User/ListDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(20.0, false)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/User/ListDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(20.0, true)))
        .mount(&server)
        .await;

    let bridge = bridge_against(&server).await;
    bridge.start().await.unwrap();

    let device = bridge.device(55).unwrap();
    assert!(!device.capabilities().await.contains("meter_power.daily"));

    // The next poll sees the meter and recreates the metering surface.
    bridge.sync_from_list().await.unwrap();
    let caps = device.capabilities().await;
    assert!(caps.contains("meter_power.daily"));
    assert!(caps.contains("measure_power"));

    bridge.shutdown();
}

#[tokio::test]
async fn vanished_devices_are_removed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/User/ListDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(20.0, false)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/User/ListDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let bridge = bridge_against(&server).await;
    bridge.start().await.unwrap();
    assert!(bridge.device(55).is_ok());

    bridge.sync_from_list().await.unwrap();
    assert!(matches!(
        bridge.device(55),
        Err(CoreError::DeviceNotFound { id: 55 })
    ));

    bridge.shutdown();
}

#[tokio::test]
async fn failed_push_retains_the_diff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/User/ListDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(20.0, false)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/Device/SetAta"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let bridge = bridge_against(&server).await;
    bridge.start().await.unwrap();
    let device = bridge.device(55).unwrap();

    device
        .set_capability("target_temperature", CapabilityValue::Number(25.0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The push failed; the diff stays queued for a later retry and the
    // merged state still shows the last known remote value.
    assert!(device.has_pending().await);
    assert_eq!(
        device.capability_value("target_temperature").await,
        Some(CapabilityValue::Number(20.0))
    );

    bridge.shutdown();
}
