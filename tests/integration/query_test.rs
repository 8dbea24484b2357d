//! Query execution integration tests.
//!
//! Tests classification gating, the row cap and connection release.

use db_warden::config::ConnectionSpec;
use db_warden::db::{
    DriverConnector, Engine, ExecutionResult, FailingConnector, MockConnector, MockDatabaseClient,
    Value,
};
use db_warden::error::WardenError;
use db_warden::query::{QueryExecutor, MAX_ROWS};
use pretty_assertions::assert_eq;

const ORDERED: &str = "SELECT id FROM orders ORDER BY id DESC";

fn spec() -> ConnectionSpec {
    ConnectionSpec::new("shop", Engine::MySql, "localhost", "shop", "reader", "pw")
}

fn descending_ids(count: i64) -> ExecutionResult {
    ExecutionResult::with_data(
        vec!["id".to_string()],
        (0..count).rev().map(|id| vec![Value::Int(id)]).collect(),
    )
}

#[tokio::test]
async fn test_row_cap_keeps_engine_order() {
    let connector = MockConnector::new(
        MockDatabaseClient::new(Engine::MySql).with_query_result(ORDERED, descending_ids(250)),
    );

    let result = QueryExecutor::new(&connector)
        .execute(&spec(), ORDERED)
        .await
        .unwrap();

    assert_eq!(result.row_count(), MAX_ROWS);
    assert!(result.truncated);
    assert_eq!(result.rows.first(), Some(&vec![Value::Int(249)]));
    assert_eq!(result.rows.last(), Some(&vec![Value::Int(150)]));
    // The statement reaches the engine unchanged, without a wrapping subquery.
    assert_eq!(connector.stats().executed(), vec![ORDERED]);
}

#[tokio::test]
async fn test_small_result_is_not_truncated() {
    let connector = MockConnector::new(
        MockDatabaseClient::new(Engine::MySql).with_query_result(ORDERED, descending_ids(3)),
    );

    let result = QueryExecutor::new(&connector)
        .execute(&spec(), ORDERED)
        .await
        .unwrap();

    assert_eq!(result.row_count(), 3);
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_typed_values_serialize_natively() {
    let sql = "SELECT id, paid, total, placed_on FROM orders";
    let connector = MockConnector::new(MockDatabaseClient::new(Engine::PostgreSql).with_query_result(
        sql,
        ExecutionResult::with_data(
            vec![
                "id".to_string(),
                "paid".to_string(),
                "total".to_string(),
                "placed_on".to_string(),
            ],
            vec![vec![
                Value::Int(7),
                Value::Bool(true),
                Value::Float(19.5),
                Value::Null,
            ]],
        ),
    ));

    let result = QueryExecutor::new(&connector)
        .execute(&spec(), sql)
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({
            "columns": ["id", "paid", "total", "placed_on"],
            "rows": [[7, true, 19.5, null]],
            "truncated": false
        })
    );
}

#[tokio::test]
async fn test_every_path_releases_the_connection() {
    let connector = MockConnector::new(
        MockDatabaseClient::new(Engine::MySql)
            .with_query_result(ORDERED, descending_ids(1))
            .with_query_error("SELECT broken", "You have an error in your SQL syntax"),
    );
    let executor = QueryExecutor::new(&connector);

    executor.execute(&spec(), ORDERED).await.unwrap();
    executor.execute(&spec(), "SELECT broken").await.unwrap_err();
    executor.execute(&spec(), "DROP TABLE orders").await.unwrap_err();

    // The rejected statement never opened a connection.
    assert_eq!(connector.stats().opened(), 2);
    assert_eq!(connector.stats().closed(), 2);
}

#[tokio::test]
async fn test_engine_error_is_verbatim() {
    let connector = MockConnector::new(
        MockDatabaseClient::new(Engine::MySql)
            .with_query_error("SELECT * FROM nope", "Table 'shop.nope' doesn't exist"),
    );

    let err = QueryExecutor::new(&connector)
        .execute(&spec(), "SELECT * FROM nope")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Query error: Table 'shop.nope' doesn't exist");
}

#[tokio::test]
async fn test_rejection_reports_reason() {
    let connector = FailingConnector::new("must not be reached");

    let err = QueryExecutor::new(&connector)
        .execute(&spec(), "SELECT 1; DROP TABLE t")
        .await
        .unwrap_err();

    match err {
        WardenError::Rejected(reason) => assert!(reason.contains("DROP")),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_live_postgres_row_cap() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let spec = ConnectionSpec::from_url("live", &url).unwrap();

    let result = QueryExecutor::new(&DriverConnector::default())
        .execute(&spec, "SELECT n FROM generate_series(1, 500) AS n ORDER BY n DESC")
        .await
        .unwrap();

    assert_eq!(result.row_count(), MAX_ROWS);
    assert!(result.truncated);
    assert_eq!(result.rows[0], vec![Value::Int(500)]);
}

#[tokio::test]
async fn test_live_postgres_extended_types_are_not_null() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let spec = ConnectionSpec::from_url("live", &url).unwrap();

    let result = QueryExecutor::new(&DriverConnector::default())
        .execute(
            &spec,
            "SELECT ARRAY[1,2], interval '1 day', '10.0.0.1'::inet, 'NaN'::numeric, \
             123456789012345678901234567890123::numeric, 'a'::\"char\", 42::oid, now()::timetz",
        )
        .await
        .unwrap();

    assert_eq!(result.row_count(), 1);
    assert!(
        result.rows[0].iter().all(|v| !v.is_null()),
        "{:?}",
        result.rows[0]
    );
    assert_eq!(
        serde_json::to_value(&result.rows[0][..4]).unwrap(),
        serde_json::json!([[1, 2], "1 day", "10.0.0.1", "NaN"])
    );
}

#[tokio::test]
async fn test_live_mysql_select() {
    let Ok(url) = std::env::var("MYSQL_DATABASE_URL") else {
        eprintln!("Skipping test: MYSQL_DATABASE_URL not set");
        return;
    };
    let spec = ConnectionSpec::from_url("live", &url).unwrap();

    let result = QueryExecutor::new(&DriverConnector::default())
        .execute(&spec, "SELECT 1 AS one")
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["one"]);
    assert_eq!(result.row_count(), 1);
}
