//! Safety classification integration tests.

use db_warden::safety::classify_sql;

#[test]
fn test_documented_cases() {
    let cases = [
        ("SELECT 1", true),
        ("DROP TABLE t", false),
        ("SELECT 1; DROP TABLE t", false),
        ("", false),
        ("  select 1  ;  ", true),
    ];

    for (sql, allowed) in cases {
        assert_eq!(classify_sql(sql).allowed, allowed, "classifying {sql:?}");
    }
}

#[test]
fn test_cte_and_multiline_select() {
    let sql = "
        WITH totals AS (
            SELECT customer_id, SUM(total) AS spent
            FROM orders
            GROUP BY customer_id
        )
        SELECT * FROM totals ORDER BY spent DESC
    ";
    assert!(classify_sql(sql).allowed);
}

#[test]
fn test_mutation_hidden_after_select_is_rejected() {
    let result = classify_sql("select * from t;\n  insert into audit values (1);");
    assert!(!result.allowed);
    assert!(result.reason.starts_with("INSERT"));
}

#[test]
fn test_classification_is_pure() {
    let first = classify_sql("SELECT 1");
    let second = classify_sql("SELECT 1");
    assert_eq!(first, second);
}
