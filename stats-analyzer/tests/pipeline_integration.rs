//! End-to-end tests of the statistics pipeline against an in-memory
//! DataFusion store.

use std::io::Write;

use stats_analyzer::prelude::*;
use stats_analyzer::stats::{FrequencyOrder, Granularity};
use tempfile::NamedTempFile;

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn pipeline_with(config: PipelineConfig) -> StatsPipeline {
    StatsPipeline::builder().config(config).build().unwrap()
}

fn people_csv() -> NamedTempFile {
    csv_file(
        "id,name,age,date\n\
         1,alice,30,2024-01-01\n\
         2,bob,40,2024-02-01\n\
         3,carol,50,2024-03-01\n",
    )
}

#[tokio::test]
async fn test_explicit_key_file_loads_without_surrogate() {
    let file = people_csv();
    let pipeline = pipeline_with(PipelineConfig::default());

    let (manifest, load) = pipeline.import(file.path()).await.unwrap();

    assert!(manifest.has_explicit_key);
    assert!(!manifest.first_row_is_data);
    assert!(load.has_explicit_key);
    assert_eq!(load.rows_loaded, 3);
    assert_eq!(load.batches, 1);
    assert!(load.relation.starts_with("id_name_age_"));
    assert_eq!(load.relation.len(), "id_name_age_".len() + 6);

    let described = pipeline.store().describe(&load.relation).await.unwrap();
    let tags: Vec<_> = described.iter().map(|c| (c.name.as_str(), c.type_tag)).collect();
    assert_eq!(
        tags,
        vec![
            ("id", TypeTag::Integer),
            ("name", TypeTag::String),
            ("age", TypeTag::Integer),
            ("date", TypeTag::Date),
        ]
    );
}

#[tokio::test]
async fn test_manifest_types_survive_the_store() {
    let file = csv_file(
        "label,price,qty,seen_at,day\n\
         a,1.5,3,2024-01-01 10:00:00,2024-01-01\n\
         b,,4,2024-01-02 11:30:00.250,2024-01-02\n",
    );
    let pipeline = pipeline_with(PipelineConfig::default());
    let (manifest, load) = pipeline.import(file.path()).await.unwrap();

    let described = pipeline.store().describe(&load.relation).await.unwrap();
    let described: Vec<_> = described
        .into_iter()
        .filter(|c| c.name != "id")
        .map(|c| (c.name, c.type_tag))
        .collect();
    let expected: Vec<_> = manifest
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.type_tag))
        .collect();
    assert_eq!(described, expected);
    assert!(manifest.column("price").unwrap().nullable);
}

#[tokio::test]
async fn test_headerless_file_gets_synthetic_names_and_surrogate_key() {
    let file = csv_file(
        "Apple,1.99,100,2024-01-01\n\
         Apple,1.99,100,2024-01-01\n\
         Apple,1.99,100,2024-01-01\n",
    );
    let pipeline = pipeline_with(PipelineConfig::default());
    let (manifest, load) = pipeline.import(file.path()).await.unwrap();

    assert!(manifest.first_row_is_data);
    assert!(!manifest.has_explicit_key);
    assert_eq!(
        manifest.column_names().collect::<Vec<_>>(),
        vec!["column_1", "column_2", "column_3", "column_4"]
    );
    assert_eq!(load.rows_loaded, 3);
    assert!(load.relation.starts_with("column_1_column_2_column_3_"));

    let rows = pipeline
        .store()
        .query(&format!("SELECT * FROM \"{}\" ORDER BY \"id\"", load.relation))
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    let first = &rows[0];
    assert_eq!(first.get("id").and_then(StoreValue::as_u64), Some(1));
    assert_eq!(first.get("column_1").map(StoreValue::to_text).as_deref(), Some("Apple"));
    assert_eq!(first.get("column_2").and_then(StoreValue::as_f64), Some(1.99));
    assert_eq!(first.get("column_3").and_then(StoreValue::as_u64), Some(100));
    assert_eq!(
        first.get("column_4").map(StoreValue::to_text).as_deref(),
        Some("2024-01-01")
    );
    assert_eq!(rows[2].get("id").and_then(StoreValue::as_u64), Some(3));
}

#[tokio::test]
async fn test_full_run_assembles_column_statistics() {
    let file = people_csv();
    let pipeline = pipeline_with(PipelineConfig::default());
    let outcome = pipeline.run("chat", file.path()).await.unwrap();

    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    let stats = &outcome.stats;
    assert_eq!(stats.total_rows(), Some(3));
    assert!(stats.get_str("id").is_none());

    let age = stats.get_str("age").unwrap();
    assert_eq!(age.unique_count, Some(3));
    assert_eq!(age.min, Some(30.0));
    assert_eq!(age.max, Some(50.0));
    assert_eq!(age.avg, Some(40.0));
    assert_eq!(age.median, Some(40.0));
    let low = age.quantile_low.unwrap();
    assert!((30.0..=50.0).contains(&low));
    assert_eq!(age.quantile_low2, None);

    let name = stats.get_str("name").unwrap();
    assert_eq!(name.unique_count, Some(3));
    assert_eq!(name.avg, None);

    let months = stats
        .get(&StatKey::Dates {
            column: "date".to_string(),
            granularity: Granularity::Month,
        })
        .unwrap();
    assert_eq!(months.date_buckets.len(), 3);
    assert!(months.date_buckets[0].truncated_timestamp.starts_with("2024-03-01"));
    assert_eq!(months.date_buckets[0].count, 1);
    assert!(months.date_buckets[0].auxiliary.contains_key("avg__age"));

    let years = stats.get_str("dates_date__year").unwrap();
    assert_eq!(years.date_buckets.len(), 1);
    assert_eq!(years.date_buckets[0].count, 3);

    let graph = stats.get_str("graph_date__day").unwrap();
    assert!(graph.date_buckets[0].truncated_timestamp.starts_with("2024-01-01"));
    assert!(stats.get_str("graph_date__year").is_none());

    let top = stats.get_str("name__top").unwrap();
    assert_eq!(top.frequency_groups.len(), 3);
    assert_eq!(top.frequency_groups[0].percent_of_total, Some(33.33));
    let rare = stats.get_str("name__rare").unwrap();
    assert!(rare.frequency_groups.is_empty());
}

#[tokio::test]
async fn test_integer_median_and_quantiles_are_not_truncated() {
    let file = csv_file(
        "name,qty,big\n\
         a,1,9223372036854775806\n\
         b,2,9223372036854775807\n",
    );
    let pipeline = pipeline_with(PipelineConfig::default());
    let outcome = pipeline.run("chat", file.path()).await.unwrap();
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.manifest.column("qty").unwrap().type_tag, TypeTag::Integer);

    let qty = outcome.stats.get_str("qty").unwrap();
    assert_eq!(qty.median, Some(1.5));
    assert_eq!(qty.avg, Some(1.5));
    let high = qty.quantile_high.unwrap();
    assert!((1.0..=2.0).contains(&high), "{high}");

    let big = outcome.stats.get_str("big").unwrap();
    assert!(big.median.unwrap() > 9.2e18);
}

#[tokio::test]
async fn test_frequency_tables_follow_cardinality() {
    let cities = [
        "Oslo", "Bergen", "Paris", "Lyon", "Rome", "Milan", "Madrid", "Porto", "Lisbon", "Vienna",
        "Prague", "Berlin", "Munich", "Dublin", "Cork",
    ];
    let mut content = String::from("city,code\n");
    for i in 0..1_200 {
        content.push_str(&format!("{},c{i}\n", cities[i % cities.len()]));
    }
    let file = csv_file(&content);
    let config = PipelineConfig::builder()
        .batch_size(500)
        .parallel_queries(true)
        .build()
        .unwrap();
    let pipeline = pipeline_with(config);

    let outcome = pipeline.run("chat", file.path()).await.unwrap();
    assert_eq!(outcome.load.batches, 3);
    assert_eq!(outcome.stats.get_str("city").unwrap().unique_count, Some(15));
    assert_eq!(outcome.stats.get_str("code").unwrap().unique_count, Some(1_200));

    let top = outcome
        .stats
        .get(&StatKey::Frequency {
            columns: vec!["city".to_string()],
            order: FrequencyOrder::Top,
        })
        .unwrap();
    assert_eq!(top.frequency_groups.len(), 10);
    assert_eq!(top.frequency_groups[0].count, 80);
    assert_eq!(top.frequency_groups[0].percent_of_total, Some(6.67));
    assert_eq!(top.title.as_deref(), Some("Most frequent values of city"));

    let rare = outcome.stats.get_str("city__rare").unwrap();
    assert_eq!(rare.frequency_groups.len(), 10);
    assert!(outcome.stats.get_str("code__top").is_none());
    assert!(outcome.stats.get_str("code__rare").is_none());
}

#[tokio::test]
async fn test_header_only_file_is_empty_input() {
    let file = csv_file("name,qty\n");
    let pipeline = pipeline_with(PipelineConfig::default());
    let err = pipeline.run("chat", file.path()).await.unwrap_err();
    assert!(matches!(err, StatsError::EmptyInput(_)));
    assert_eq!(pipeline.sessions().relation("chat").await.unwrap(), None);
}

#[tokio::test]
async fn test_ragged_rows_and_late_type_mismatches() {
    let file = csv_file("n,label\n1,a\n2\nx,b,extra\n");
    let config = PipelineConfig::builder().sample_size(2).build().unwrap();
    let pipeline = pipeline_with(config);

    let (manifest, load) = pipeline.import(file.path()).await.unwrap();
    assert_eq!(manifest.column("n").unwrap().type_tag, TypeTag::Integer);
    assert_eq!(load.rows_loaded, 3);
    assert_eq!(load.truncated_rows, 1);
    assert_eq!(load.rejected_values, 1);

    let rows = pipeline
        .store()
        .query(&format!(
            "SELECT COUNT(\"n\") AS \"c\" FROM \"{}\"",
            load.relation
        ))
        .await
        .unwrap();
    assert_eq!(rows[0].get("c").and_then(StoreValue::as_u64), Some(2));
}

#[tokio::test]
async fn test_configured_delimiter_skips_sniffing() {
    let file = csv_file("a|b\n1|2\n3|4\n");
    let config = PipelineConfig::builder().delimiter(b'|').build().unwrap();
    let pipeline = pipeline_with(config);
    let (manifest, load) = pipeline.import(file.path()).await.unwrap();
    assert_eq!(manifest.len(), 2);
    assert_eq!(load.rows_loaded, 2);
}
