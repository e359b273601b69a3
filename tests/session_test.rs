//! Command session behaviour over an in-memory WebSocket pair.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tc08_relay::device::{DeviceController, TemperatureUnit};
use tc08_relay::driver::{DriverCall, DriverOp, MockDriver};
use tc08_relay::error::{DriverErrorCode, RelayError};
use tc08_relay::session::{CommandSession, SessionReport, SessionState, TerminationReason};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type Client = WebSocketStream<DuplexStream>;

/// Relay end and peer end of one in-memory connection.
async fn ws_pair() -> (WebSocketStream<DuplexStream>, Client) {
    let (server_io, client_io) = tokio::io::duplex(4096);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    (server, client)
}

/// Start a session on `driver` and return the peer end plus the session task.
async fn start_session(driver: MockDriver) -> (Client, JoinHandle<SessionReport>) {
    let (server, client) = ws_pair().await;

    let controller = DeviceController::new(driver, TemperatureUnit::Celsius);
    let task = tokio::spawn(async move {
        let mut session = CommandSession::new(server, controller).with_peer("test-peer");
        session.run().await
    });
    (client, task)
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string())).await.unwrap();
}

/// Next data frame from the relay, or `None` once it has closed the connection.
async fn next_reply(client: &mut Client) -> Option<String> {
    while let Some(frame) = client.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn finish(task: JoinHandle<SessionReport>) -> SessionReport {
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("session did not terminate")
        .unwrap()
}

#[tokio::test]
async fn test_only_measurement_is_answered() {
    let driver = MockDriver::new();
    let shared = driver.clone();
    let (mut client, task) = start_session(driver).await;

    send(&mut client, r#"{"command":"open_instrument"}"#).await;
    send(&mut client, r#"{"command":"measure_all_channels"}"#).await;

    let reply = next_reply(&mut client).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(value.as_object().unwrap().len(), 9);

    client.close(None).await.unwrap();
    let report = finish(task).await;

    assert!(matches!(report.reason, TerminationReason::PeerClosed));
    assert_eq!(report.commands_dispatched, 2);
    assert_eq!(report.replies_sent, 1);
    assert_eq!(shared.close_count(), 1);
}

#[tokio::test]
async fn test_configure_then_measure_reports_readings() {
    let mut readings = [0.0; 9];
    readings[1] = 21.5;
    let driver = MockDriver::new().with_readings(readings);
    let shared = driver.clone();
    let (mut client, task) = start_session(driver).await;

    send(&mut client, r#"{"command":"open_instrument"}"#).await;
    send(&mut client, r#"{"command":"configure_channel","channel":1,"type":"K"}"#).await;
    send(&mut client, r#"{"command":"measure_all_channels"}"#).await;

    assert_eq!(
        next_reply(&mut client).await.unwrap(),
        r#"{"ch_0":0.0,"ch_1":21.5,"ch_2":0.0,"ch_3":0.0,"ch_4":0.0,"ch_5":0.0,"ch_6":0.0,"ch_7":0.0,"ch_8":0.0}"#
    );
    assert!(shared.calls().contains(&DriverCall::SetChannel {
        handle: 1,
        channel: 1,
        tc_type: b'K',
    }));

    drop(client);
    let report = finish(task).await;
    assert!(matches!(report.reason, TerminationReason::PeerClosed));
    assert_eq!(shared.close_count(), 1);
}

#[tokio::test]
async fn test_abrupt_disconnect_closes_instrument() {
    let driver = MockDriver::new();
    let shared = driver.clone();
    let (mut client, task) = start_session(driver).await;

    send(&mut client, r#"{"command":"open_instrument"}"#).await;
    send(&mut client, r#"{"command":"enable_sampling","sampling_interval":250}"#).await;
    drop(client);

    let report = finish(task).await;
    assert!(report.error().is_none());
    assert_eq!(report.commands_dispatched, 2);
    assert_eq!(shared.close_count(), 1);
    assert!(!shared.is_unit_open());
}

#[tokio::test]
async fn test_malformed_message_terminates_session() {
    let driver = MockDriver::new();
    let shared = driver.clone();
    let (mut client, task) = start_session(driver).await;

    send(&mut client, r#"{"command":"open_instrument"}"#).await;
    send(&mut client, "this is not json").await;

    assert_eq!(next_reply(&mut client).await, None);
    let report = finish(task).await;

    assert!(matches!(
        report.error(),
        Some(RelayError::MalformedCommand(_))
    ));
    assert_eq!(report.commands_dispatched, 1);
    assert_eq!(report.replies_sent, 0);
    assert_eq!(shared.close_count(), 1);
}

#[tokio::test]
async fn test_unknown_command_is_malformed() {
    let (mut client, task) = start_session(MockDriver::new()).await;

    send(&mut client, r#"{"command":"calibrate"}"#).await;

    let report = finish(task).await;
    assert!(matches!(
        report.error(),
        Some(RelayError::MalformedCommand(_))
    ));
    assert_eq!(report.commands_dispatched, 0);
    assert_eq!(next_reply(&mut client).await, None);
}

#[tokio::test]
async fn test_driver_failure_terminates_without_reply() {
    let driver = MockDriver::new();
    let shared = driver.clone();
    let (mut client, task) = start_session(driver).await;

    send(&mut client, r#"{"command":"open_instrument"}"#).await;
    shared.fail_on(DriverOp::GetSingle, 7);
    send(&mut client, r#"{"command":"measure_all_channels"}"#).await;

    assert_eq!(next_reply(&mut client).await, None);
    let report = finish(task).await;

    match report.error() {
        Some(RelayError::Driver(err)) => {
            assert_eq!(err.code, DriverErrorCode::NotResponding);
            assert_eq!(
                err.to_string(),
                "7: Cannot get a reply from a USB TC-08. [error when calling: measure_all]"
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(shared.close_count(), 1);
}

#[tokio::test]
async fn test_interval_below_minimum_never_reaches_driver() {
    let driver = MockDriver::new().with_minimum_interval(100);
    let shared = driver.clone();
    let (mut client, task) = start_session(driver).await;

    send(&mut client, r#"{"command":"open_instrument"}"#).await;
    send(&mut client, r#"{"command":"enable_sampling","sampling_interval":10}"#).await;

    let report = finish(task).await;
    assert!(matches!(
        report.error(),
        Some(RelayError::InvalidInterval {
            requested: 10,
            minimum: 100
        })
    ));
    assert!(!shared
        .calls()
        .iter()
        .any(|call| matches!(call, DriverCall::Run { .. })));
    assert_eq!(shared.close_count(), 1);
}

#[tokio::test]
async fn test_no_device_ends_session() {
    let driver = MockDriver::new().without_units();
    let shared = driver.clone();
    let (mut client, task) = start_session(driver).await;

    send(&mut client, r#"{"command":"open_instrument"}"#).await;

    let report = finish(task).await;
    assert!(matches!(report.error(), Some(RelayError::NoDeviceAvailable)));
    assert_eq!(shared.close_count(), 0);
}

#[tokio::test]
async fn test_binary_frames_carry_commands() {
    let (mut client, task) = start_session(MockDriver::new()).await;

    client
        .send(Message::Binary(br#"{"command":"open_instrument"}"#.to_vec()))
        .await
        .unwrap();
    client
        .send(Message::Binary(br#"{"command":"measure_all_channels"}"#.to_vec()))
        .await
        .unwrap();

    assert!(next_reply(&mut client).await.unwrap().starts_with(r#"{"ch_0":"#));

    client
        .send(Message::Binary(vec![0xff, 0xfe, 0x00]))
        .await
        .unwrap();
    let report = finish(task).await;
    assert!(matches!(
        report.error(),
        Some(RelayError::MalformedCommand(_))
    ));
}

#[tokio::test]
async fn test_cancelled_session_still_closes_instrument() {
    let driver = MockDriver::new();
    let shared = driver.clone();
    let (mut client, task) = start_session(driver).await;

    send(&mut client, r#"{"command":"open_instrument"}"#).await;
    for _ in 0..100 {
        if shared.is_unit_open() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(shared.is_unit_open());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(shared.close_count(), 1);
    assert!(!shared.is_unit_open());
}

#[tokio::test]
async fn test_state_is_terminated_after_run() {
    let driver = MockDriver::new();
    let shared = driver.clone();
    let (server, mut client) = ws_pair().await;
    let controller = DeviceController::new(driver, TemperatureUnit::Kelvin);
    let mut session = CommandSession::new(server, controller);
    assert_eq!(session.state(), SessionState::Active);

    // Frames sit in the in-memory buffer until the session reads them
    send(&mut client, r#"{"command":"open_instrument"}"#).await;
    drop(client);

    let report = session.run().await;
    assert!(matches!(report.reason, TerminationReason::PeerClosed));
    assert_eq!(report.commands_dispatched, 1);
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(shared.close_count(), 1);
}
