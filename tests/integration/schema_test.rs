//! Schema discovery integration tests.
//!
//! Exercises scan-target resolution and harvesting end to end through the
//! connector seam.

use db_warden::config::ConnectionSpec;
use db_warden::connection::fetch_schema;
use db_warden::db::{
    ColumnOverview, DriverConnector, Engine, MockConnector, MockDatabaseClient, SchemaOverview,
    TableEntry, TableOverview,
};
use pretty_assertions::assert_eq;

fn not_null(name: &str, data_type: &str) -> ColumnOverview {
    ColumnOverview::new(name, data_type).nullable(false)
}

#[tokio::test]
async fn test_mysql_shop_scenario() {
    let connector = MockConnector::new(MockDatabaseClient::new(Engine::MySql).with_table(
        "shop",
        TableEntry::new(Some("shop"), "orders"),
        vec![not_null("id", "int"), not_null("total", "decimal")],
    ));
    let spec = ConnectionSpec::new("shop", Engine::MySql, "localhost", "shop", "reader", "pw");

    let schema = fetch_schema(&connector, &spec).await.unwrap();

    assert_eq!(
        schema,
        SchemaOverview {
            database: "shop".to_string(),
            schemas: vec!["shop".to_string()],
            tables: vec![TableOverview::new("shop", "orders")
                .with_columns(vec![not_null("id", "int"), not_null("total", "decimal")])],
        }
    );
    assert_eq!(connector.stats().opened(), 1);
    assert_eq!(connector.stats().closed(), 1);
}

#[tokio::test]
async fn test_postgres_analytics_scenario() {
    let connector = MockConnector::new(
        MockDatabaseClient::new(Engine::PostgreSql)
            .with_table(
                "analytics",
                TableEntry::new(Some("public"), "users").with_comment("registered users"),
                vec![not_null("id", "integer"), ColumnOverview::new("email", "text")],
            )
            .with_table(
                "analytics",
                TableEntry::new(Some("reporting"), "daily_totals"),
                vec![not_null("day", "date"), not_null("total", "numeric")],
            )
            .with_enriched_columns(
                "public",
                "users",
                vec![
                    not_null("id", "integer").with_comment("surrogate key"),
                    ColumnOverview::new("email", "text"),
                ],
            ),
    );
    let spec = ConnectionSpec::new(
        "analytics",
        Engine::PostgreSql,
        "pg.internal",
        "analytics",
        "readonly",
        "pw",
    );

    let schema = fetch_schema(&connector, &spec).await.unwrap();

    assert_eq!(schema.database, "analytics");
    assert_eq!(schema.schemas, vec!["public", "reporting"]);
    assert_eq!(schema.table_count(), 2);

    let users = schema.find_table("public", "users").unwrap();
    assert_eq!(users.comment.as_deref(), Some("registered users"));
    assert_eq!(users.columns[0].comment.as_deref(), Some("surrogate key"));

    // No enriched rows for this table, so the generic listing is used.
    let totals = schema.find_table("reporting", "daily_totals").unwrap();
    assert_eq!(
        totals.columns,
        vec![not_null("day", "date"), not_null("total", "numeric")]
    );
}

#[tokio::test]
async fn test_explicit_postgres_schemas_limit_the_scan() {
    let connector = MockConnector::new(
        MockDatabaseClient::new(Engine::PostgreSql)
            .with_table("analytics", TableEntry::new(Some("public"), "users"), vec![])
            .with_table(
                "analytics",
                TableEntry::new(Some("reporting"), "daily_totals"),
                vec![],
            ),
    );
    let spec = ConnectionSpec::new(
        "analytics",
        Engine::PostgreSql,
        "pg.internal",
        "analytics,reporting,reporting",
        "readonly",
        "pw",
    );

    let schema = fetch_schema(&connector, &spec).await.unwrap();

    assert_eq!(schema.schemas, vec!["reporting"]);
    assert_eq!(schema.table_count(), 1);
    assert_eq!(schema.tables[0].name, "daily_totals");
}

#[tokio::test]
async fn test_mariadb_additional_catalogs() {
    let connector = MockConnector::new(
        MockDatabaseClient::new(Engine::MariaDb)
            .with_table("shop", TableEntry::new(Some("shop"), "orders"), vec![])
            .with_table("archive", TableEntry::new(Some("archive"), "old_orders"), vec![])
            .with_table("audit", TableEntry::new(None, "events"), vec![]),
    );
    let spec = ConnectionSpec::new(
        "legacy",
        Engine::MariaDb,
        "localhost",
        "shop, archive ,audit",
        "reader",
        "pw",
    );

    let schema = fetch_schema(&connector, &spec).await.unwrap();

    assert_eq!(schema.database, "shop");
    assert_eq!(schema.schemas, vec!["archive", "audit"]);
    assert_eq!(
        schema
            .tables
            .iter()
            .map(|t| format!("{}.{}", t.schema, t.name))
            .collect::<Vec<_>>(),
        vec!["archive.old_orders", "audit.events"]
    );
}

#[tokio::test]
async fn test_schema_json_round_trip() {
    let connector = MockConnector::new(MockDatabaseClient::new(Engine::MySql).with_table(
        "shop",
        TableEntry::new(Some("shop"), "orders").with_comment("customer orders"),
        vec![
            not_null("id", "int").with_comment("order number"),
            ColumnOverview::new("note", "varchar"),
        ],
    ));
    let spec = ConnectionSpec::new("shop", Engine::MySql, "localhost", "shop", "reader", "pw");
    let schema = fetch_schema(&connector, &spec).await.unwrap();

    let json = serde_json::to_string(&schema).unwrap();
    let restored: SchemaOverview = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, schema);
}

#[tokio::test]
async fn test_live_postgres_schema() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let spec = ConnectionSpec::from_url("live", &url).unwrap();

    let schema = fetch_schema(&DriverConnector::default(), &spec)
        .await
        .unwrap();

    assert!(!schema.schemas.is_empty());
    assert_eq!(schema.database, spec.primary_database());
}

#[tokio::test]
async fn test_live_mysql_schema() {
    let Ok(url) = std::env::var("MYSQL_DATABASE_URL") else {
        eprintln!("Skipping test: MYSQL_DATABASE_URL not set");
        return;
    };
    let spec = ConnectionSpec::from_url("live", &url).unwrap();

    let schema = fetch_schema(&DriverConnector::default(), &spec)
        .await
        .unwrap();

    assert!(!schema.schemas.is_empty());
}
