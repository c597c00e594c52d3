//! Construction-time failures. No Redis server is needed: nothing listens on
//! the discard port, so connecting is refused immediately.

use std::sync::Arc;

use redis_list_input::config::InputConfig;
use redis_list_input::errors::InputError;
use redis_list_input::input::ListInput;
use redis_list_input::transform::decode::JsonDecoder;

fn unreachable() -> InputConfig {
    InputConfig {
        host: "127.0.0.1:9".into(),
        connect_timeout: "500ms".into(),
        ..InputConfig::default()
    }
}

#[tokio::test]
async fn bad_blocking_timeout_fails_before_connecting() {
    let cfg = InputConfig {
        blocking_timeout: "abc".into(),
        ..unreachable()
    };

    // A ping/connect error here would mean a socket was attempted first.
    match ListInput::init(&cfg).await {
        Err(InputError::DurationParse(msg)) => assert!(msg.contains("abc")),
        Err(other) => panic!("expected DurationParse, got {other:?}"),
        Ok(_) => panic!("expected DurationParse, got a running input"),
    }
}

#[tokio::test]
async fn unknown_codec_fails_before_connecting() {
    let cfg = InputConfig {
        codec: "avro".into(),
        ..unreachable()
    };
    assert!(matches!(
        ListInput::init(&cfg).await,
        Err(InputError::Config(_))
    ));
}

#[tokio::test]
async fn unreachable_host_fails_ping_and_skips_script() {
    let cfg = unreachable().validate().unwrap();
    assert!(cfg.is_batched());

    match ListInput::with_decoder(cfg, Arc::new(JsonDecoder)).await {
        Err(InputError::PingFailed(_)) => {}
        Err(other) => panic!("expected PingFailed, got {other:?}"),
        Ok(_) => panic!("expected PingFailed, got a running input"),
    }
}

#[tokio::test]
async fn unreachable_host_fails_in_single_item_mode_too() {
    let cfg = InputConfig {
        batch_count: 1,
        ..unreachable()
    };
    let err = ListInput::init(&cfg).await.err().expect("init must fail");
    assert!(err.is_fatal());
    assert!(matches!(err, InputError::PingFailed(_)));
}
