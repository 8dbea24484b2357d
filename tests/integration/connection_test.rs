//! Connection testing integration tests.
//!
//! Tests that probe outcomes are reported as values and that the probed
//! connection is always released.

use db_warden::config::{ConnectionSpec, Limits};
use db_warden::connection::ConnectionTester;
use db_warden::db::{
    ColumnOverview, DriverConnector, Engine, FailingConnector, MockConnector, MockDatabaseClient,
    TableEntry,
};

fn analytics_spec() -> ConnectionSpec {
    ConnectionSpec::new(
        "analytics",
        Engine::PostgreSql,
        "pg.internal",
        "analytics",
        "readonly",
        "pw",
    )
}

#[tokio::test]
async fn test_successful_probe_carries_schema() {
    let connector = MockConnector::new(
        MockDatabaseClient::new(Engine::PostgreSql)
            .with_table(
                "analytics",
                TableEntry::new(Some("public"), "users"),
                vec![ColumnOverview::new("id", "integer").nullable(false)],
            )
            .with_failing_enriched_query(),
    );

    let result = ConnectionTester::new(&connector)
        .test(&analytics_spec())
        .await;

    assert!(result.success);
    assert!(result.message.contains("Found 1 tables."));
    let schema = result.schema.unwrap();
    assert_eq!(schema.schemas, vec!["public"]);
    assert_eq!(connector.stats().closed(), 1);
}

#[tokio::test]
async fn test_empty_database_still_names_a_schema() {
    let connector = MockConnector::new(MockDatabaseClient::new(Engine::PostgreSql));

    let result = ConnectionTester::new(&connector)
        .test(&analytics_spec())
        .await;

    assert!(result.success);
    assert!(result.message.contains("Found 0 tables."));
    assert_eq!(result.schema.unwrap().schemas, vec!["public"]);
}

#[tokio::test]
async fn test_failed_probe_serializes_without_schema() {
    let connector = FailingConnector::new("Cannot connect to pg.internal:5432.");

    let result = ConnectionTester::new(&connector)
        .test(&analytics_spec())
        .await;

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({
            "success": false,
            "message": "Connection failed: Cannot connect to pg.internal:5432."
        })
    );
}

#[tokio::test]
async fn test_unreachable_host_is_a_failed_result() {
    let connector = DriverConnector::new(Limits {
        connect_timeout_secs: 2,
        ..Limits::default()
    });
    let spec = ConnectionSpec::new(
        "bad",
        Engine::MySql,
        "nonexistent.invalid.host",
        "shop",
        "reader",
        "pw",
    );

    let result = ConnectionTester::new(&connector).test(&spec).await;

    assert!(!result.success);
    assert!(result.schema.is_none());
}

#[tokio::test]
async fn test_invalid_spec_is_a_failed_result() {
    let spec = ConnectionSpec::new("bad", Engine::MySql, "localhost", " , ", "reader", "pw");

    let result = ConnectionTester::new(&DriverConnector::default())
        .test(&spec)
        .await;

    assert!(!result.success);
    assert!(result.message.contains("Database name is required"));
}

#[tokio::test]
async fn test_live_postgres_probe() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let spec = ConnectionSpec::from_url("live", &url).unwrap();

    let result = ConnectionTester::new(&DriverConnector::default())
        .test(&spec)
        .await;

    assert!(result.success, "{}", result.message);
}
