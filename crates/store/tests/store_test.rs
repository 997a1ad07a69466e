use codemode_core::traits::{ExecutionLog, SqlExecutor};
use codemode_core::types::SqlValue;
use codemode_store::{initialize_schema, SqliteExecutionLog, SqliteStore};

#[tokio::test]
async fn test_file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codemode.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        initialize_schema(&store).await.unwrap();
        store
            .execute("CREATE TABLE notes (body TEXT)", &[])
            .await
            .unwrap();
        store
            .execute("INSERT INTO notes (body) VALUES (?)", &[SqlValue::from("hello")])
            .await
            .unwrap();

        let log = SqliteExecutionLog::new(store.clone()).await.unwrap();
        log.record("return 'hi';", Some("\"hi\"".into()), None)
            .await
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let rows = store.execute("SELECT body FROM notes", &[]).await.unwrap();
    assert_eq!(rows[0]["body"], "hello");

    let log = SqliteExecutionLog::new(store).await.unwrap();
    let recent = log.recent(5).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].result.as_deref(), Some("\"hi\""));
}

#[tokio::test]
async fn test_sql_tools_and_log_share_one_database() {
    let store = SqliteStore::in_memory().unwrap();
    let log = SqliteExecutionLog::new(store.clone()).await.unwrap();
    log.record("return 1;", Some("1".into()), None).await.unwrap();

    let rows = store
        .execute("SELECT code, result, error FROM execution_log", &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["code"], "return 1;");
    assert!(rows[0]["error"].is_null());
}
