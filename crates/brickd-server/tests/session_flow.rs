//! End-to-end flows through the assembled app: dispatch, script lifecycle,
//! and delivery to registered sessions. Sessions are plain channels here,
//! registered the same way the WebSocket layer registers real ones.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use brickd_core::SessionId;
use brickd_runtime::NullHardware;
use brickd_server::{App, SystemControl};

struct NullSystem;
impl SystemControl for NullSystem {
    fn halt_system(&self) {}
}

fn app() -> Arc<App> {
    App::new(Arc::new(NullHardware), Arc::new(NullSystem))
}

fn connect(app: &App) -> (SessionId, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(64);
    (app.sessions.connect(tx), rx)
}

async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> Value {
    let text = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("session channel closed");
    serde_json::from_str(&text).unwrap()
}

/// Receive frames until one matches, failing the test on timeout.
async fn recv_until(rx: &mut mpsc::Receiver<String>, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let frame = recv_frame(rx).await;
        if pred(&frame) {
            return frame;
        }
    }
}

#[tokio::test]
async fn bogus_action_notifies_only_the_caller() {
    let app = app();
    let (_a, mut rx_a) = connect(&app);
    let (b, mut rx_b) = connect(&app);

    app.dispatcher.dispatch(b, r#"{"act":"bogusAction"}"#).await;

    let frame = recv_frame(&mut rx_b).await;
    assert_eq!(frame["msgTyp"], "Exception");
    assert_eq!(frame["code"], "UNKNOWN_ACTION");
    assert_eq!(frame["params"]["action"], "bogusAction");

    // The other session hears nothing about it.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn script_lifecycle_is_broadcast() {
    let app = app();
    let (a, mut rx_a) = connect(&app);
    let (_b, mut rx_b) = connect(&app);

    app.dispatcher
        .dispatch(
            a,
            r#"{"act":"runScript","sLang":"rhai","sText":"message(\"hi\");","sFStop":false}"#,
        )
        .await;

    for rx in [&mut rx_a, &mut rx_b] {
        let starting = recv_until(rx, |f| f["msgTyp"] == "InfoCoded").await;
        assert_eq!(starting["code"], "SCRIPT_STARTING");
        let info = recv_frame(rx).await;
        assert_eq!(info["msgTyp"], "InfoUser");
        assert_eq!(info["txt"], "hi");
        let ended = recv_frame(rx).await;
        assert_eq!(ended["code"], "SCRIPT_ENDED");
    }
}

#[tokio::test]
async fn hostile_script_stop_broadcasts_single_forced_notification() {
    let app = app();
    let (a, mut rx_a) = connect(&app);

    app.dispatcher
        .dispatch(
            a,
            r#"{"act":"runScript","sLang":"rhai","sText":"setStopGraceTimeout(1000); while true { }","sFStop":false}"#,
        )
        .await;
    let starting = recv_until(&mut rx_a, |f| f["msgTyp"] == "InfoCoded").await;
    assert_eq!(starting["code"], "SCRIPT_STARTING");

    app.dispatcher.dispatch(a, r#"{"act":"stopScript"}"#).await;

    let forced = recv_until(&mut rx_a, |f| f["code"] == "SCRIPT_STOP_FORCED").await;
    assert_eq!(forced["msgTyp"], "ScriptException");

    // Forced termination ends the run without SCRIPT_ENDED, and the forced
    // notification is sent exactly once.
    tokio::time::sleep(Duration::from_secs(1)).await;
    while let Ok(text) = rx_a.try_recv() {
        let frame: Value = serde_json::from_str(&text).unwrap();
        assert_ne!(frame["code"], "SCRIPT_STOP_FORCED");
        assert_ne!(frame["code"], "SCRIPT_ENDED");
    }
}

#[tokio::test]
async fn second_submission_without_force_is_rejected_to_caller_only() {
    let app = app();
    let (a, mut rx_a) = connect(&app);
    let (b, mut rx_b) = connect(&app);

    app.dispatcher
        .dispatch(
            a,
            r#"{"act":"runScript","sLang":"rhai","sText":"sleep(10);","sFStop":false}"#,
        )
        .await;
    let starting = recv_until(&mut rx_a, |f| f["msgTyp"] == "InfoCoded").await;
    assert_eq!(starting["code"], "SCRIPT_STARTING");

    app.dispatcher
        .dispatch(b, r#"{"act":"runScript","sLang":"rhai","sText":"1;","sFStop":false}"#)
        .await;

    let rejected =
        recv_until(&mut rx_b, |f| f["msgTyp"] == "ScriptException" || f["msgTyp"] == "Exception")
            .await;
    assert_eq!(rejected["code"], "SCRIPT_ALREADY_RUNNING");

    // Submitter of the running script is not bothered by it.
    assert!(rx_a.try_recv().is_err());
    let _ = app.scripts.stop(Duration::from_millis(1000)).await;
}

#[tokio::test]
async fn sensor_values_flow_into_scripts() {
    let app = app();
    let (a, mut rx_a) = connect(&app);

    app.dispatcher
        .dispatch(
            a,
            r#"{"act":"setXSnsValue","xSnsNam":"xTouch","xSnsTyp":"Tch1","xSnsVal":{"isStarted":true,"touchs":{"fire":1}}}"#,
        )
        .await;
    app.dispatcher
        .dispatch(
            a,
            r#"{"act":"runScript","sLang":"rhai","sText":"let s = xSensorValue(\"xTouch\"); message(`started=${s.isStarted}`);","sFStop":false}"#,
        )
        .await;

    let info = recv_until(&mut rx_a, |f| f["msgTyp"] == "InfoUser").await;
    assert_eq!(info["txt"], "started=true");
}

#[tokio::test]
async fn malformed_sensor_push_names_the_missing_field() {
    let app = app();
    let (a, mut rx_a) = connect(&app);

    app.dispatcher
        .dispatch(a, r#"{"act":"setXSnsValue","xSnsNam":"xTouch"}"#)
        .await;

    let frame = recv_frame(&mut rx_a).await;
    assert_eq!(frame["code"], "MESSAGE_FIELD_NOT_FOUND");
    assert_eq!(frame["params"]["field"], "xSnsTyp");
}

#[tokio::test]
async fn shutdown_action_cancels_the_daemon_token() {
    let app = app();
    let (a, _rx_a) = connect(&app);

    app.dispatcher.dispatch(a, r#"{"act":"shutdownGnikrap"}"#).await;
    timeout(Duration::from_secs(5), app.shutdown.cancelled())
        .await
        .expect("shutdown token never fired");
}
