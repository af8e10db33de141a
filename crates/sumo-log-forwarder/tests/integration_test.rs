// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use mockito::{Matcher, Server};
use sumo_log_forwarder::{
    batcher::Batch,
    decoder::encode_frame,
    http::build_client,
    sender::Sender,
    Config, ForwarderError, LogEntry, PipelineManager, Record,
};
use tokio::{
    io::AsyncWriteExt,
    time::{sleep, timeout, Duration, Instant},
};

const RECEIVER_PATH: &str = "/receiver/v1/http/token";

fn config_for(server: &Server) -> Config {
    Config::new(&format!("{}{RECEIVER_PATH}", server.url()))
        .expect("failed to create config")
        .with_retry_interval(Duration::from_millis(100))
}

fn batch(lines: &[&'static str]) -> Batch {
    let mut batch = Batch::default();
    for line in lines {
        batch.push(Record::new(*line, "stdout", 0));
    }
    batch
}

fn frame(line: &'static str) -> Vec<u8> {
    encode_frame(&LogEntry {
        source: "stdout".to_string(),
        time_nano: 1_700_000_000_000_000_000,
        line: Bytes::from_static(line.as_bytes()),
        partial: false,
        partial_log_metadata: None,
    })
}

#[tokio::test]
async fn test_deliver_retries_until_ok_with_identical_body() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("POST", RECEIVER_PATH)
        .match_header("Content-Type", "text/plain")
        .match_body(Matcher::Exact("first\nsecond\n".to_string()))
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(2)
        .create_async()
        .await;
    let success = server
        .mock("POST", RECEIVER_PATH)
        .match_header("Content-Type", "text/plain")
        .match_body(Matcher::Exact("first\nsecond\n".to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&server);
    let sender = Sender::new(build_client(&config).expect("failed to build client"), &config);

    let start = Instant::now();
    timeout(Duration::from_secs(5), sender.deliver(&batch(&["first", "second"])))
        .await
        .expect("delivery should succeed on the third attempt");

    assert!(start.elapsed() >= Duration::from_millis(200));
    failing.assert_async().await;
    success.assert_async().await;
}

#[tokio::test]
async fn test_non_200_success_status_is_retried() {
    let mut server = Server::new_async().await;
    let accepted = server
        .mock("POST", RECEIVER_PATH)
        .with_status(202)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("POST", RECEIVER_PATH)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&server);
    let sender = Sender::new(build_client(&config).expect("failed to build client"), &config);
    timeout(Duration::from_secs(5), sender.deliver(&batch(&["line"])))
        .await
        .expect("delivery should succeed on the second attempt");

    accepted.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_deliver_gzip_body() {
    let mut server = Server::new_async().await;
    let config = config_for(&server).with_compression(9);
    let sender = Sender::new(build_client(&config).expect("failed to build client"), &config);
    let batch = batch(&["compressed", "lines"]);
    let expected = sender.serialize(&batch).expect("failed to serialize batch");

    let mock = server
        .mock("POST", RECEIVER_PATH)
        .match_header("Content-Type", "text/plain")
        .match_header("Content-Encoding", "gzip")
        .match_body(Matcher::from(expected.to_vec()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    timeout(Duration::from_secs(5), sender.deliver(&batch))
        .await
        .expect("delivery timed out");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_pipeline_ships_stream_and_drains_on_end_of_stream() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", RECEIVER_PATH)
        .match_body(Matcher::Exact("one\ntwo\nthree\n".to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    // A long interval leaves end of stream as the only flush trigger.
    let config = config_for(&server).with_sending_interval(Duration::from_secs(3600));
    let manager = PipelineManager::new();
    let (mut writer, reader) = tokio::io::duplex(4096);
    manager
        .start("container-1", config, reader)
        .expect("failed to start pipeline");

    for line in ["one", "two", "three"] {
        writer
            .write_all(&frame(line))
            .await
            .expect("failed to write frame");
    }
    drop(writer);

    timeout(Duration::from_secs(5), manager.wait())
        .await
        .expect("pipeline did not drain");
    assert!(!manager.is_running("container-1"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_pipeline_skips_corrupt_frame() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", RECEIVER_PATH)
        .match_body(Matcher::Exact("valid\n".to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&server).with_sending_interval(Duration::from_secs(3600));
    let manager = PipelineManager::new();
    let (mut writer, reader) = tokio::io::duplex(4096);
    manager
        .start("container-1", config, reader)
        .expect("failed to start pipeline");

    writer
        .write_all(&u32::MAX.to_be_bytes())
        .await
        .expect("failed to write prefix");
    writer
        .write_all(&frame("valid"))
        .await
        .expect("failed to write frame");
    drop(writer);

    timeout(Duration::from_secs(5), manager.wait())
        .await
        .expect("pipeline did not drain");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_pipeline_splits_batches_by_size() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("POST", RECEIVER_PATH)
        .match_body(Matcher::Exact("aaaa\nbbbb\n".to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", RECEIVER_PATH)
        .match_body(Matcher::Exact("cccc\n".to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&server)
        .with_batch_size(10)
        .with_sending_interval(Duration::from_secs(3600));
    let manager = PipelineManager::new();
    let (mut writer, reader) = tokio::io::duplex(4096);
    manager
        .start("container-1", config, reader)
        .expect("failed to start pipeline");

    for line in ["aaaa", "bbbb", "cccc"] {
        writer
            .write_all(&frame(line))
            .await
            .expect("failed to write frame");
    }
    drop(writer);

    timeout(Duration::from_secs(5), manager.wait())
        .await
        .expect("pipeline did not drain");
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_duplicate_start_is_rejected_synchronously() {
    let server = Server::new_async().await;
    let manager = PipelineManager::new();
    let (_writer, reader) = tokio::io::duplex(64);
    manager
        .start("container-1", config_for(&server), reader)
        .expect("failed to start pipeline");

    let (_other_writer, other_reader) = tokio::io::duplex(64);
    let result = manager.start("container-1", config_for(&server), other_reader);
    assert!(matches!(result, Err(ForwarderError::AlreadyRunning(_))));
    assert_eq!(manager.len(), 1);

    manager.stop("container-1").expect("failed to stop pipeline");
    assert!(manager.is_empty());
    timeout(Duration::from_secs(5), manager.shutdown())
        .await
        .expect("shutdown timed out");
}

#[tokio::test]
async fn test_stop_drains_pending_batch_to_endpoint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", RECEIVER_PATH)
        .match_body(Matcher::Exact("pending\nlogs\n".to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    // Neither the timer nor the size threshold can flush: only stop does.
    let config = config_for(&server).with_sending_interval(Duration::from_secs(3600));
    let manager = PipelineManager::new();
    let (mut writer, reader) = tokio::io::duplex(4096);
    manager
        .start("container-1", config, reader)
        .expect("failed to start pipeline");

    for line in ["pending", "logs"] {
        writer
            .write_all(&frame(line))
            .await
            .expect("failed to write frame");
    }
    sleep(Duration::from_millis(100)).await;

    manager.stop("container-1").expect("failed to stop pipeline");
    timeout(Duration::from_secs(5), manager.shutdown())
        .await
        .expect("pipeline did not drain after stop");
    mock.assert_async().await;

    // The writer stayed open the whole time.
    drop(writer);
}

#[tokio::test]
async fn test_pipeline_with_single_slot_queues_delivers_everything() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", RECEIVER_PATH)
        .match_body(Matcher::Regex(r"^line-\d\n$".to_string()))
        .with_status(200)
        .expect(5)
        .create_async()
        .await;

    // One record per batch; the decoder waits on the full record queue.
    let config = config_for(&server)
        .with_queue_size(1)
        .with_batch_size(6)
        .with_sending_interval(Duration::from_secs(3600));
    let manager = PipelineManager::new();
    let (mut writer, reader) = tokio::io::duplex(4096);
    manager
        .start("container-1", config, reader)
        .expect("failed to start pipeline");

    for line in ["line-1", "line-2", "line-3", "line-4", "line-5"] {
        writer
            .write_all(&frame(line))
            .await
            .expect("failed to write frame");
        // Give the sender time to take each batch before the next one lands.
        sleep(Duration::from_millis(50)).await;
    }
    drop(writer);

    timeout(Duration::from_secs(5), manager.wait())
        .await
        .expect("pipeline did not drain");
    mock.assert_async().await;
}
