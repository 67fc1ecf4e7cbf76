use super::*;
use bytes::BufMut;
use std::path::Path;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    pool: Arc<BufferPool>,
    tx: mpsc::Sender<WriterEvent>,
    handle: LogWriterHandle,
    task: JoinHandle<Result<WriterMetricsSnapshot, LogWriterError>>,
}

fn start(config: LogWriterConfig) -> Harness {
    let pool = Arc::new(BufferPool::new(8, 64));
    let (writer, handle) = LogWriter::open(config, Arc::clone(&pool)).unwrap();
    let tx = handle.sender();
    let task = tokio::spawn(writer.run());
    Harness {
        pool,
        tx,
        handle,
        task,
    }
}

async fn message(pool: &BufferPool, data: &[u8]) -> Message {
    let mut buf = pool.acquire().await.unwrap();
    buf.put_slice(data);
    Message::new(buf)
}

async fn send(h: &Harness, data: &[u8]) {
    let msg = message(&h.pool, data).await;
    h.tx.send(msg.into()).await.unwrap();
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// =============================================================================
// Config tests
// =============================================================================

#[test]
fn test_config_defaults() {
    let config = LogWriterConfig::default();
    assert_eq!(config.path, PathBuf::from("log.out"));
    assert_eq!(config.queue_size, 1024);
    assert_eq!(config.write_buffer_size, 64 * 1024);
    assert_eq!(config.flush_interval, Duration::from_millis(100));
    assert_eq!(config.sync_every, 0);
    assert_eq!(config.max_write_retries, 3);
    assert_eq!(config.retry_delay, Duration::from_millis(10));
}

#[test]
fn test_config_chained_builders() {
    let config = LogWriterConfig::new("/data/log.out")
        .with_queue_size(4)
        .with_write_buffer_size(128)
        .with_flush_interval(Duration::from_secs(1))
        .with_sync_every(5)
        .with_retries(1, Duration::ZERO);

    assert_eq!(config.path, PathBuf::from("/data/log.out"));
    assert_eq!(config.queue_size, 4);
    assert_eq!(config.write_buffer_size, 128);
    assert_eq!(config.flush_interval, Duration::from_secs(1));
    assert_eq!(config.sync_every, 5);
    assert_eq!(config.max_write_retries, 1);
}

// =============================================================================
// Lifecycle tests
// =============================================================================

#[tokio::test]
async fn test_open_missing_directory_fails() {
    let pool = Arc::new(BufferPool::new(1, 16));
    let config = LogWriterConfig::new("/nonexistent/dir/log.out");

    let err = LogWriter::open(config, pool).err().unwrap();
    assert!(matches!(err, LogWriterError::Open { .. }));
}

#[tokio::test]
async fn test_message_written_as_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let h = start(LogWriterConfig::new(&path));
    assert_eq!(h.handle.state(), WriterState::Running);

    send(&h, b"hello").await;
    h.handle.quit().await.unwrap();

    let snapshot = timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();
    assert_eq!(read(&path), "hello\n");
    assert_eq!(snapshot.messages_written, 1);
    assert_eq!(snapshot.bytes_written, 6);
    assert_eq!(h.handle.state(), WriterState::Terminated);
    assert_eq!(h.pool.available(), 8);
}

#[tokio::test]
async fn test_quit_drains_queued_messages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");

    let pool = Arc::new(BufferPool::new(8, 64));
    let (writer, handle) = LogWriter::open(LogWriterConfig::new(&path), Arc::clone(&pool)).unwrap();
    let tx = handle.sender();

    // Everything is queued before the writer runs, quit included.
    for line in ["one", "two", "three"] {
        tx.send(message(&pool, line.as_bytes()).await.into()).await.unwrap();
    }
    handle.quit().await.unwrap();

    let snapshot = writer.run().await.unwrap();
    assert_eq!(read(&path), "one\ntwo\nthree\n");
    assert_eq!(snapshot.messages_written, 3);
    assert_eq!(pool.available(), 8);
}

#[tokio::test]
async fn test_messages_after_quit_are_still_written() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");

    let pool = Arc::new(BufferPool::new(8, 64));
    let (writer, handle) = LogWriter::open(LogWriterConfig::new(&path), Arc::clone(&pool)).unwrap();
    let tx = handle.sender();

    handle.quit().await.unwrap();
    tx.send(message(&pool, b"straggler").await.into()).await.unwrap();
    handle.rotate().await.unwrap();

    let snapshot = writer.run().await.unwrap();
    assert_eq!(read(&path), "straggler\n");
    assert_eq!(snapshot.rotations, 0);
    assert_eq!(pool.available(), 8);
}

#[tokio::test]
async fn test_dropped_senders_act_as_quit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let h = start(LogWriterConfig::new(&path));

    send(&h, b"last words").await;
    let waiter = h.handle.clone();
    drop(h.handle);
    drop(h.tx);
    // The clone still holds the queue open.
    assert_eq!(waiter.state(), WriterState::Running);
    let state = waiter.state.clone();
    drop(waiter);

    let snapshot = timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();
    assert_eq!(snapshot.messages_written, 1);
    assert_eq!(read(&path), "last words\n");
    assert_eq!(*state.borrow(), WriterState::Terminated);
}

#[tokio::test]
async fn test_commands_after_termination_fail() {
    let dir = TempDir::new().unwrap();
    let h = start(LogWriterConfig::new(dir.path().join("log.out")));

    h.handle.quit().await.unwrap();
    h.handle.wait_terminated().await;
    timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();

    assert!(matches!(h.handle.rotate().await, Err(LogWriterError::Closed)));
    assert!(matches!(h.handle.quit().await, Err(LogWriterError::Closed)));
}

#[tokio::test]
async fn test_embedded_newlines_not_escaped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let h = start(LogWriterConfig::new(&path));

    send(&h, b"a\nb").await;
    h.handle.quit().await.unwrap();
    timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();

    assert_eq!(read(&path), "a\nb\n");
}

// =============================================================================
// Rotation tests
// =============================================================================

#[tokio::test]
async fn test_rotate_splits_old_and_new_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let rotated = dir.path().join("log.out.1");
    let h = start(LogWriterConfig::new(&path));

    send(&h, b"before").await;
    wait_for(|| h.handle.metrics().messages_written == 1).await;

    std::fs::rename(&path, &rotated).unwrap();
    h.handle.rotate().await.unwrap();
    send(&h, b"after").await;
    h.handle.quit().await.unwrap();

    let snapshot = timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();
    assert_eq!(read(&rotated), "before\n");
    assert_eq!(read(&path), "after\n");
    assert_eq!(snapshot.rotations, 1);
}

#[tokio::test]
async fn test_rotate_takes_effect_at_its_queue_position() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let rotated = dir.path().join("log.out.1");

    let pool = Arc::new(BufferPool::new(8, 64));
    let (writer, handle) = LogWriter::open(LogWriterConfig::new(&path), Arc::clone(&pool)).unwrap();
    let tx = handle.sender();

    // The whole sequence is queued before the writer consumes anything.
    tx.send(message(&pool, b"before").await.into()).await.unwrap();
    handle.rotate().await.unwrap();
    tx.send(message(&pool, b"after").await.into()).await.unwrap();
    handle.quit().await.unwrap();
    std::fs::rename(&path, &rotated).unwrap();

    let snapshot = writer.run().await.unwrap();
    assert_eq!(read(&rotated), "before\n");
    assert_eq!(read(&path), "after\n");
    assert_eq!(snapshot.rotations, 1);
    assert_eq!(pool.available(), 8);
}

#[tokio::test]
async fn test_rotate_between_bursts_splits_them_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let rotated = dir.path().join("log.out.1");

    let pool = Arc::new(BufferPool::new(8, 64));
    let (writer, handle) = LogWriter::open(LogWriterConfig::new(&path), Arc::clone(&pool)).unwrap();
    let tx = handle.sender();

    for line in ["a1", "a2", "a3"] {
        tx.send(message(&pool, line.as_bytes()).await.into()).await.unwrap();
    }
    tx.send(ControlCommand::Rotate.into()).await.unwrap();
    for line in ["b1", "b2"] {
        tx.send(message(&pool, line.as_bytes()).await.into()).await.unwrap();
    }
    std::fs::rename(&path, &rotated).unwrap();

    let task = tokio::spawn(writer.run());
    wait_for(|| handle.metrics().messages_written == 5).await;
    handle.quit().await.unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();

    assert_eq!(read(&rotated), "a1\na2\na3\n");
    assert_eq!(read(&path), "b1\nb2\n");
}

#[tokio::test]
async fn test_rotate_without_rename_keeps_appending() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let h = start(LogWriterConfig::new(&path));

    send(&h, b"one").await;
    h.handle.rotate().await.unwrap();
    send(&h, b"two").await;
    h.handle.quit().await.unwrap();
    timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();

    assert_eq!(read(&path), "one\ntwo\n");
}

#[tokio::test]
async fn test_reopen_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    let h = start(LogWriterConfig::new(sub.join("log.out")));

    std::fs::remove_dir_all(&sub).unwrap();
    h.handle.rotate().await.unwrap();

    let result = timeout(WAIT, h.task).await.unwrap().unwrap();
    assert!(matches!(result, Err(LogWriterError::Reopen { .. })));
    assert_eq!(h.handle.state(), WriterState::Terminated);
}

// =============================================================================
// Flush and sync tests
// =============================================================================

#[tokio::test]
async fn test_flush_tick_pushes_buffered_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let h = start(LogWriterConfig::new(&path).with_flush_interval(Duration::from_millis(10)));

    send(&h, b"visible").await;
    wait_for(|| read(&path) == "visible\n").await;
    assert!(h.handle.metrics().flushes >= 1);

    h.handle.quit().await.unwrap();
    timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_sync_every_counts_fsyncs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.out");
    let h = start(LogWriterConfig::new(&path).with_sync_every(2));

    for i in 0..4 {
        send(&h, format!("line {i}").as_bytes()).await;
    }
    h.handle.quit().await.unwrap();

    let snapshot = timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();
    assert_eq!(snapshot.messages_written, 4);
    // Two from the policy, one on close.
    assert_eq!(snapshot.syncs, 3);
}

#[tokio::test]
async fn test_sync_disabled_only_syncs_on_close() {
    let dir = TempDir::new().unwrap();
    let h = start(LogWriterConfig::new(dir.path().join("log.out")));

    for _ in 0..5 {
        send(&h, b"x").await;
    }
    h.handle.quit().await.unwrap();

    let snapshot = timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();
    assert_eq!(snapshot.syncs, 1);
}

// =============================================================================
// Error tests
// =============================================================================

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_failed_writes_counted_and_buffers_returned() {
    // The first line is buffered. Making room for the second needs a flush,
    // and writes to /dev/full fail with ENOSPC.
    let config = LogWriterConfig::new("/dev/full")
        .with_write_buffer_size(0)
        .with_retries(2, Duration::from_millis(1));
    let h = start(config);

    send(&h, b"doomed").await;
    send(&h, b"also doomed").await;
    h.handle.quit().await.unwrap();

    let snapshot = timeout(WAIT, h.task).await.unwrap().unwrap().unwrap();
    assert_eq!(snapshot.messages_written, 1);
    assert_eq!(snapshot.write_errors, 1);
    assert_eq!(h.pool.available(), 8);
}
