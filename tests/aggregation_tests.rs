mod common;

use common::*;
use sales_analytics::aggregation::UNCATEGORIZED;
use sales_analytics::query::SalesRepository;
use sales_analytics::{AnalyticsError, DocType};

fn schema_error() -> AnalyticsError {
    AnalyticsError::Schema("column \"total_incl\" does not exist".to_string())
}

#[tokio::test]
async fn test_daily_revenue_subtracts_tax_per_header() {
    let Harness { system, repo } = harness();
    repo.insert(Doc::invoice("IN001", date(2024, 1, 10), "001").totals(1000.0, 150.0));
    repo.insert(Doc::invoice("IN002", date(2024, 1, 10), "001").totals(500.0, 75.0));
    repo.insert(Doc::invoice("IN003", date(2024, 1, 10), "002").totals(9999.0, 0.0));
    repo.insert(Doc::quotation("QU001", date(2024, 1, 10), "001").totals(700.0, 0.0));

    let f = filter(date(2024, 1, 1), date(2024, 1, 31)).with_store("001");
    let daily = system.daily_aggregations(&f, TENANT).await.unwrap();

    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].date, date(2024, 1, 10));
    assert_eq!(daily[0].total_revenue, 1275.0);
    assert_eq!(daily[0].transaction_count, 2);
    assert_eq!(daily[0].average_transaction, 637.5);
}

#[tokio::test]
async fn test_credit_notes_reduce_revenue_but_not_listings() {
    let Harness { system, repo } = harness();
    repo.insert(Doc::invoice("IN001", date(2024, 2, 1), "001").totals(230.0, 30.0));
    repo.insert(Doc::credit_note("CR001", date(2024, 2, 1), "001").totals(-115.0, -15.0));

    let f = filter(date(2024, 2, 1), date(2024, 2, 29));
    let branch = system.branch_aggregations(&f, TENANT).await.unwrap();
    assert_eq!(branch[0].total_revenue, 100.0);
    assert_eq!(branch[0].transaction_count, 2);

    let headers = system.sales_headers(&f, TENANT).await.unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].doc_no, "IN001");

    let credit_lines = system
        .sales_lines(&f, &[DocType::CreditNote], TENANT)
        .await
        .unwrap();
    assert!(credit_lines.iter().all(|line| line.doc_type == "CR"));
}

#[tokio::test]
async fn test_repeated_reads_are_served_from_cache() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);
    let f = filter(date(2024, 1, 1), date(2024, 1, 31)).with_salespeople(["S2", "S1"]);

    let first = system.all_aggregations(&f, TENANT).await.unwrap();
    let headers = system.sales_headers(&f, TENANT).await.unwrap();
    assert_eq!(repo.total_calls(), 6);
    repo.reset_calls();

    let reordered = filter(date(2024, 1, 1), date(2024, 1, 31)).with_salespeople(["S1", "S2"]);
    let second = system.all_aggregations(&reordered, TENANT).await.unwrap();
    assert_eq!(system.sales_headers(&reordered, TENANT).await.unwrap(), headers);

    assert_eq!(repo.total_calls(), 0);
    assert_eq!(first.daily, second.daily);
    assert_eq!(first.product, second.product);
    assert_ne!(first.operation_id, second.operation_id);
}

#[tokio::test]
async fn test_exclude_filters_bypass_the_result_cache() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);
    let f = filter(date(2024, 1, 1), date(2024, 1, 31)).excluding(["RETAIL"]);

    system.branch_aggregations(&f, TENANT).await.unwrap();
    system.branch_aggregations(&f, TENANT).await.unwrap();
    assert_eq!(repo.calls("branch_aggregations"), 2);

    let included = filter(date(2024, 1, 1), date(2024, 1, 31)).including(["RETAIL"]);
    system.branch_aggregations(&included, TENANT).await.unwrap();
    system.branch_aggregations(&included, TENANT).await.unwrap();
    assert_eq!(repo.calls("branch_aggregations"), 3);
}

#[tokio::test]
async fn test_chunked_range_matches_single_query() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);

    // 2024-01-01..=2024-03-15 is 75 days: chunks of 30, 30 and 15
    let f = filter(date(2024, 1, 1), date(2024, 3, 15));
    let chunks = system.engine().chunker().chunks_for(f.start, f.end);
    let lengths: Vec<i64> = chunks.iter().map(|c| c.days()).collect();
    assert_eq!(lengths, vec![30, 30, 15]);

    let all = system.all_aggregations(&f, TENANT).await.unwrap();
    let headers = system.sales_headers(&f, TENANT).await.unwrap();
    assert_eq!(repo.calls("daily_aggregations"), 3);
    assert_eq!(repo.calls("sales_headers"), 3);

    let docs = DocType::REVENUE;
    assert_eq!(all.daily, repo.daily_aggregations(&f, docs).await.unwrap());
    assert_eq!(all.branch, repo.branch_aggregations(&f, docs).await.unwrap());
    assert_eq!(
        all.salesperson,
        repo.salesperson_aggregations(&f, docs).await.unwrap()
    );
    assert_eq!(all.category, repo.category_aggregations(&f, docs).await.unwrap());
    assert_eq!(all.product, repo.product_aggregations(&f, docs).await.unwrap());
    assert_eq!(
        headers,
        repo.sales_headers(&f, DocType::LISTING).await.unwrap()
    );
}

#[tokio::test]
async fn test_chunk_results_are_reused_by_later_ranges() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);

    let wide = filter(date(2024, 1, 1), date(2024, 3, 15));
    system.daily_aggregations(&wide, TENANT).await.unwrap();
    repo.reset_calls();

    let first_chunk = filter(date(2024, 1, 1), date(2024, 1, 30));
    system.daily_aggregations(&first_chunk, TENANT).await.unwrap();
    assert_eq!(repo.calls("daily_aggregations"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_all_aggregations_stops_at_first_failing_step() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);
    repo.fail_next("branch_aggregations", 10, schema_error);

    let f = filter(date(2024, 1, 1), date(2024, 1, 31));
    let err = system.all_aggregations(&f, TENANT).await.unwrap_err();

    match &err {
        AnalyticsError::AggregationStep {
            step,
            active_queries,
            pool,
            ..
        } => {
            assert_eq!(step, "branch");
            assert_eq!(*active_queries, 0);
            assert_eq!(pool.as_ref().unwrap().name, TENANT);
        }
        other => panic!("expected AggregationStep, got {other:?}"),
    }
    assert!(matches!(err.root_cause(), AnalyticsError::Schema(_)));
    assert!(!err.is_temporary());

    assert_eq!(repo.calls("daily_aggregations"), 1);
    assert_eq!(repo.calls("branch_aggregations"), 2);
    assert_eq!(repo.calls("salesperson_aggregations"), 0);
}

#[tokio::test]
async fn test_exclude_never_returns_excluded_category_but_keeps_uncategorized() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);
    let f = filter(date(2024, 1, 1), date(2024, 1, 31)).excluding(["RETAIL"]);

    let lines = system.sales_lines_with_category(&f, TENANT).await.unwrap();

    assert!(!lines.is_empty());
    assert!(lines
        .iter()
        .all(|l| l.customer_category.as_deref() != Some("RETAIL")));
    assert!(lines.iter().any(|l| l.customer_category.is_none()));
    assert!(lines
        .iter()
        .any(|l| l.line.customer_code.as_deref() == Some("C-UNKNOWN")));
}

#[tokio::test]
async fn test_pre_grouping_is_shared_across_include_exclude_variants() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);
    let base = filter(date(2024, 1, 1), date(2024, 1, 31));

    let all = system
        .sales_lines_with_category(&base, TENANT)
        .await
        .unwrap();
    let retail = system
        .sales_lines_with_category(&base.clone().including(["RETAIL"]), TENANT)
        .await
        .unwrap();
    let not_retail = system
        .sales_lines_with_category(&base.clone().excluding(["RETAIL"]), TENANT)
        .await
        .unwrap();

    assert_eq!(repo.calls("sales_lines"), 1);
    assert_eq!(repo.calls("customer_categories"), 1);
    assert_eq!(retail.len() + not_retail.len(), all.len());
    assert!(retail
        .iter()
        .all(|l| l.customer_category.as_deref() == Some("RETAIL")));

    let groups = system
        .engine()
        .cache()
        .get::<sales_analytics::aggregation::CategoryGroups>(
            &system.engine().cache().keys().build_base(
                sales_analytics::aggregation::GROUPED_DOMAIN,
                TENANT,
                &base,
                DocType::LISTING,
            ),
        )
        .await
        .unwrap();
    assert!(groups.contains_key(UNCATEGORIZED));
}

#[tokio::test(start_paused = true)]
async fn test_pre_grouping_failure_falls_back_to_filtered_query() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);
    repo.fail_next("customer_categories", 2, schema_error);

    let f = filter(date(2024, 1, 1), date(2024, 1, 31)).excluding(["RETAIL"]);
    let lines = system.sales_lines_with_category(&f, TENANT).await.unwrap();

    assert_eq!(repo.calls("sales_lines"), 2);
    assert_eq!(repo.calls("customer_categories"), 3);
    assert!(!lines.is_empty());
    assert!(lines
        .iter()
        .all(|l| l.customer_category.as_deref() != Some("RETAIL")));
    assert!(lines.iter().any(|l| l.customer_category.is_none()));
}

#[tokio::test]
async fn test_master_data_is_cached_per_tenant() {
    let Harness { system, repo } = harness();
    seed_quarter(&repo);

    let stores = system.engine().distinct_stores(TENANT).await.unwrap();
    let again = system.engine().distinct_stores(TENANT).await.unwrap();
    assert_eq!(stores, vec!["001", "002", "003"]);
    assert_eq!(stores, again);
    assert_eq!(repo.calls("distinct_stores"), 1);

    let salespeople = system.engine().distinct_salespeople(TENANT).await.unwrap();
    assert_eq!(salespeople, vec!["S1", "S2"]);
}

#[tokio::test]
async fn test_unknown_tenant_is_a_configuration_error() {
    let Harness { system, repo } = harness();
    let f = filter(date(2024, 1, 1), date(2024, 1, 31));

    let err = system.daily_aggregations(&f, "TH").await.unwrap_err();
    assert!(matches!(err, AnalyticsError::Config(_)));
    assert_eq!(repo.total_calls(), 0);
}

#[tokio::test]
async fn test_reads_work_without_a_cache_backend() {
    let Harness { system, repo } = harness_without_cache();
    seed_quarter(&repo);
    let f = filter(date(2024, 1, 1), date(2024, 1, 31));

    let first = system.daily_aggregations(&f, TENANT).await.unwrap();
    let second = system.daily_aggregations(&f, TENANT).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(repo.calls("daily_aggregations"), 2);
}
