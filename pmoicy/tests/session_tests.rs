//! Integration tests for the session worker and the audio sink

use pmoicy::{
    encode_metadata_block, CloseReason, ErrorKind, IcyClient, SessionEvent, SessionOutcome,
};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds an ICY body and the audio it carries
fn icy_body(metaint: usize, titles: &[&str]) -> (Vec<u8>, Vec<u8>) {
    let mut body = Vec::new();
    let mut audio = Vec::new();
    for (i, title) in titles.iter().enumerate() {
        let chunk: Vec<u8> = (0..metaint).map(|j| (i * 7 + j) as u8).collect();
        body.extend_from_slice(&chunk);
        audio.extend_from_slice(&chunk);
        let text = format!("StreamTitle='{}';", title);
        body.extend_from_slice(&encode_metadata_block(&text).unwrap());
    }
    (body, audio)
}

fn icy_response(body: Vec<u8>, metaint: usize) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(body)
        .insert_header("content-type", "audio/mpeg")
        .insert_header("icy-metaint", metaint.to_string().as_str())
        .insert_header("icy-name", "Test Radio")
}

async fn next_event(rx: &mut pmoicy::EventReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("session event in time")
        .expect("session channel open")
}

#[tokio::test]
async fn test_reader_receives_stream_without_metadata() {
    let mock_server = MockServer::start().await;
    let (body, expected_audio) = icy_body(100, &["A - One", "A - One", "B - Two"]);

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(icy_response(body, 100))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = IcyClient::builder()
        .auto_reconnect(false)
        .read_buffer_size(37)
        .audio_queue_capacity(4)
        .build()
        .unwrap();
    let (mut sink, mut reader) = client.channel_sink();
    let mut metadata = sink.subscribe_metadata(16);
    let mut session = sink.subscribe_session(16);

    let handle = client.spawn(format!("{}/live", mock_server.uri()), sink);

    let mut audio = Vec::new();
    reader.read_to_end(&mut audio).await.unwrap();
    assert_eq!(audio, expected_audio);

    let summary = handle.wait().await.unwrap();
    assert_eq!(
        summary.outcome,
        SessionOutcome::Closed(CloseReason::EndOfStream)
    );
    assert_eq!(summary.audio_bytes, 300);
    assert_eq!(summary.metadata_blocks, 3);
    assert_eq!(summary.connections_opened, 1);
    assert_eq!(summary.connections_released, 1);

    let mut events = Vec::new();
    while let Ok(event) = metadata.try_recv() {
        events.push(event);
    }
    let changes: Vec<_> = events.iter().map(|e| e.title_changed).collect();
    assert_eq!(changes, vec![true, false, true]);
    assert_eq!(events[0].block.audio_offset(), 100);
    assert_eq!(events[2].block.audio_offset(), 300);
    assert_eq!(events[2].block.artist_title(), Some((Some("B"), "Two")));

    assert!(matches!(
        next_event(&mut session).await,
        SessionEvent::Connected { .. }
    ));
    assert_eq!(
        next_event(&mut session).await,
        SessionEvent::Closed {
            reason: CloseReason::EndOfStream
        }
    );
}

#[tokio::test]
async fn test_disconnect_releases_connection_once() {
    let mock_server = MockServer::start().await;
    let titles: Vec<String> = (0..200).map(|i| format!("Track {}", i)).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let (body, _) = icy_body(64, &titles);

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(icy_response(body, 64))
        .mount(&mock_server)
        .await;

    let client = IcyClient::builder().audio_queue_capacity(1).build().unwrap();
    let (mut sink, reader) = client.channel_sink();
    let mut session = sink.subscribe_session(8);

    let handle = client.spawn(format!("{}/live", mock_server.uri()), sink);
    assert!(matches!(
        next_event(&mut session).await,
        SessionEvent::Connected { .. }
    ));

    // Le lecteur ne consomme rien : le worker attend de la place dans la file
    let stats = handle.stats();
    let summary = handle.disconnect().await.unwrap();

    assert_eq!(
        summary.outcome,
        SessionOutcome::Closed(CloseReason::Disconnected)
    );
    assert_eq!(summary.connections_opened, 1);
    assert_eq!(summary.connections_released, 1);
    assert_eq!(stats.open_connections(), 0);
    assert_eq!(
        next_event(&mut session).await,
        SessionEvent::Closed {
            reason: CloseReason::Disconnected
        }
    );
    drop(reader);
}

#[tokio::test]
async fn test_disconnect_with_unread_session_subscriber() {
    let mock_server = MockServer::start().await;
    let titles: Vec<String> = (0..50).map(|i| format!("Track {}", i)).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let (body, _) = icy_body(64, &titles);

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(icy_response(body, 64))
        .mount(&mock_server)
        .await;

    let client = IcyClient::builder().audio_queue_capacity(1).build().unwrap();
    let (mut sink, _reader) = client.channel_sink();
    // Abonné jamais lu : `Connected` remplit son channel
    let mut session = sink.subscribe_session(1);

    let handle = client.spawn(format!("{}/live", mock_server.uri()), sink);
    let stats = handle.stats();
    tokio::time::timeout(Duration::from_secs(5), async {
        while stats.opened() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection opened in time");

    let summary = tokio::time::timeout(Duration::from_secs(3), handle.disconnect())
        .await
        .expect("disconnect returns while the subscriber is full")
        .unwrap();

    assert_eq!(
        summary.outcome,
        SessionOutcome::Closed(CloseReason::Disconnected)
    );
    assert_eq!(summary.connections_released, 1);
    assert!(matches!(
        session.try_recv(),
        Ok(SessionEvent::Connected { .. })
    ));
}

#[tokio::test]
async fn test_reconnection_stops_after_max_retries() {
    let mock_server = MockServer::start().await;

    // Le serveur accepte la connexion puis ferme immédiatement
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(icy_response(Vec::new(), 16))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = IcyClient::builder()
        .max_retries(2)
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap();
    let (mut sink, _reader) = client.channel_sink();
    let mut session = sink.subscribe_session(16);

    let handle = client.spawn(format!("{}/live", mock_server.uri()), sink);
    let summary = handle.wait().await.unwrap();

    assert!(summary.is_failed());
    assert!(matches!(
        summary.outcome,
        SessionOutcome::Failed {
            kind: ErrorKind::Connection,
            ..
        }
    ));
    assert_eq!(summary.reconnects, 2);
    assert_eq!(summary.connections_opened, 3);
    assert_eq!(summary.connections_released, 3);

    let mut events = Vec::new();
    while let Ok(event) = session.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 6);
    assert!(matches!(events[0], SessionEvent::Connected { .. }));
    assert_eq!(
        events[1],
        SessionEvent::Reconnecting {
            attempt: 1,
            max_retries: 2
        }
    );
    assert_eq!(events[2], SessionEvent::Reconnected { attempt: 1 });
    assert_eq!(
        events[3],
        SessionEvent::Reconnecting {
            attempt: 2,
            max_retries: 2
        }
    );
    assert!(matches!(events[5], SessionEvent::Failed { .. }));
}

#[tokio::test]
async fn test_desync_fails_session_after_delivering_audio() {
    let mock_server = MockServer::start().await;

    let mut body = b"AAAAAAAA".to_vec();
    body.push(1);
    body.extend_from_slice(&[
        0xFF, 0xFB, 0x90, 0x00, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x11, 0x22, 0x33,
        0x44,
    ]);
    body.extend_from_slice(b"BBBBBBBB");

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(icy_response(body, 8))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = IcyClient::builder()
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap();
    let (sink, mut reader) = client.channel_sink();
    let handle = client.spawn(format!("{}/live", mock_server.uri()), sink);

    let mut audio = Vec::new();
    reader.read_to_end(&mut audio).await.unwrap();
    assert_eq!(audio, b"AAAAAAAA");

    let summary = handle.wait().await.unwrap();
    assert!(matches!(
        summary.outcome,
        SessionOutcome::Failed {
            kind: ErrorKind::Desync,
            ..
        }
    ));
    assert_eq!(summary.reconnects, 0);
    assert_eq!(summary.connections_released, 1);
}

#[tokio::test]
async fn test_initial_connection_failure_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = IcyClient::new().unwrap();
    let (sink, mut reader) = client.channel_sink();
    let handle = client.spawn(format!("{}/live", mock_server.uri()), sink);

    assert_eq!(reader.next_chunk().await, None);
    let summary = handle.wait().await.unwrap();
    assert!(matches!(
        summary.outcome,
        SessionOutcome::Failed {
            kind: ErrorKind::Connection,
            ..
        }
    ));
    assert_eq!(summary.connections_opened, 0);
}

#[tokio::test]
async fn test_dropped_reader_closes_session() {
    let mock_server = MockServer::start().await;
    let (body, _) = icy_body(32, &["One", "Two"]);

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(icy_response(body, 32))
        .mount(&mock_server)
        .await;

    let client = IcyClient::new().unwrap();
    let (sink, reader) = client.channel_sink();
    drop(reader);

    let summary = client
        .spawn(format!("{}/live", mock_server.uri()), sink)
        .wait()
        .await
        .unwrap();
    assert_eq!(
        summary.outcome,
        SessionOutcome::Closed(CloseReason::ConsumerGone)
    );
    assert_eq!(summary.connections_released, 1);
}
