mod common;

use rusqlite::Connection;
use tempfile::TempDir;

use common::{buffered, insert_id, recv_event};
use txsink::{
    config::SinkConfig,
    error::SinkError,
    runtime::events::SinkEvent,
    sink::{TaskContext, TransactionalSink},
    types::FlushTrigger,
};

fn file_config(tmp: &TempDir) -> SinkConfig {
    let mut config = buffered(1, 1_000);
    config.connection.url = format!("sqlite://{}", tmp.path().join("events.db").display());
    config
}

fn stored_ids(tmp: &TempDir) -> Vec<i64> {
    let conn = Connection::open(tmp.path().join("events.db")).expect("reader");
    let mut stmt = conn.prepare("SELECT id FROM events ORDER BY id").expect("prepare");
    stmt.query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<Vec<i64>, _>>()
        .expect("rows")
}

#[tokio::test]
async fn every_returned_invoke_is_already_committed() {
    let tmp = TempDir::new().expect("tmp");
    let (mut sink, _) = TransactionalSink::sqlite(file_config(&tmp), insert_id).expect("sink");
    let mut events = sink.subscribe();
    sink.open(&TaskContext::default()).await.expect("open");

    for id in 1..=5i64 {
        sink.invoke(&id).await.expect("invoke");
        assert_eq!(stored_ids(&tmp), (1..=id).collect::<Vec<_>>());
        assert_eq!(
            recv_event(&mut events).await,
            SinkEvent::Committed {
                trigger: FlushTrigger::Immediate,
                commands: 1,
                rows: 1,
            }
        );
    }

    let metrics = sink.metrics().await.expect("metrics");
    assert_eq!(metrics.commits, 5);
    assert_eq!(metrics.commands_committed, 5);
    assert_eq!(metrics.pending, 0);

    // nothing buffered, so explicit and checkpoint flushes have nothing to do
    assert_eq!(sink.flush().await.expect("flush"), 0);
    sink.snapshot_state(1).await.expect("checkpoint");

    sink.close().await.expect("close");
    assert_eq!(recv_event(&mut events).await, SinkEvent::Closed);
}

#[tokio::test]
async fn rejected_command_fails_invoke_and_leaves_store_consistent() {
    let tmp = TempDir::new().expect("tmp");
    let (mut sink, _) = TransactionalSink::sqlite(file_config(&tmp), insert_id).expect("sink");
    sink.open(&TaskContext::default()).await.expect("open");

    sink.invoke(&7).await.expect("first insert");
    let err = sink.invoke(&7).await.unwrap_err();
    match err {
        SinkError::Commit { command, .. } => assert!(command.contains("[7]"), "{command}"),
        other => panic!("unexpected error: {other:?}"),
    }

    // the connection is usable again right away
    sink.invoke(&8).await.expect("insert after failure");
    assert_eq!(stored_ids(&tmp), vec![7, 8]);

    let metrics = sink.metrics().await.expect("metrics");
    assert_eq!(metrics.failed_flushes, 1);
    sink.close().await.expect("close");
}
