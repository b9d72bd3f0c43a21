//! End-to-end request execution through the runner API.

use std::sync::Arc;

use gridflow::dsl::{parse_request, RequestFormat};
use gridflow::loader::MemoryLoader;
use gridflow::{Dataset, RequestError, RequestRunner};

fn monthly(year: i32, months: usize) -> Vec<String> {
    (0..months)
        .map(|i| {
            let y = year + (i / 12) as i32;
            format!("{y}-{:02}-01T00:00:00", (i % 12) + 1)
        })
        .collect()
}

fn demo_loader() -> Arc<MemoryLoader> {
    let loader = MemoryLoader::new();
    loader.insert_synthetic_grid(
        "collection://merra2",
        "tas",
        vec![0.0, 30.0, 60.0],
        vec![100.0, 110.0, 120.0],
        monthly(1980, 24),
    );
    Arc::new(loader)
}

async fn run(json: &str, loader: Arc<MemoryLoader>) -> Result<Vec<Dataset>, RequestError> {
    let schema = parse_request(json, RequestFormat::Json)?;
    RequestRunner::builder(schema)
        .loader(loader)
        .build()?
        .run()
        .await
}

#[tokio::test]
async fn test_time_average_with_domain() {
    let results = run(
        r#"{
        "project": "cip",
        "domain": [ { "name": "d0",
            "lat": { "start": 0, "end": 30 },
            "time": { "start": "1980-01-01", "end": "1980-12-01" } } ],
        "input": [ { "uri": "collection://merra2", "name": "tas:v1", "domain": "d0" } ],
        "operation": [ { "name": "core.average", "input": "v1", "axis": "t", "result": "mean" } ]
    }"#,
        demo_loader(),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "core.average[mean]");
    assert_eq!(
        results[0].attributes.get("project"),
        Some(&serde_json::json!("cip"))
    );
    let array = &results[0].arrays[0];
    // lat cut keeps 2 rows; time mean over t = 0..11 is 5.5 * 10000.
    assert_eq!(array.shape, vec![2, 3]);
    assert_eq!(array.values[0], 55000.0);
    assert_eq!(array.values[4], 55101.0);
}

#[tokio::test]
async fn test_groupby_month_climatology_end_to_end() {
    let results = run(
        r#"{
        "input": [ { "uri": "collection://merra2", "name": "tas:v1" } ],
        "operation": [ { "name": "core.noop", "input": "v1", "groupby": "t.month",
                         "result": "clim" } ]
    }"#,
        demo_loader(),
    )
    .await
    .unwrap();
    let array = &results[0].arrays[0];
    // 24 months fold into 12 climatology bins.
    assert_eq!(array.shape, vec![12, 3, 3]);
    // Bin for January averages t=0 and t=12.
    assert_eq!(array.values[0], 60000.0);
}

#[tokio::test]
async fn test_resample_yearly_end_to_end() {
    let results = run(
        r#"{
        "input": [ { "uri": "collection://merra2", "name": "tas:v1" } ],
        "operation": [ { "name": "core.noop", "input": "v1", "resample": "t.year",
                         "result": "annual" } ]
    }"#,
        demo_loader(),
    )
    .await
    .unwrap();
    let array = &results[0].arrays[0];
    assert_eq!(array.shape, vec![2, 3, 3]);
    // First year bin averages t = 0..11 at cell (0, 0).
    assert_eq!(array.values[0], 55000.0);
}

#[tokio::test]
async fn test_time_offset_domain_reads_lagged_window() {
    let results = run(
        r#"{
        "domain": [ { "name": "lagged",
            "time": { "start": "1980-01-01", "end": "1980-06-01", "offset": "1y" } } ],
        "input": [ { "uri": "collection://merra2", "name": "tas:v1", "domain": "lagged" } ],
        "operation": [ { "name": "core.noop", "input": "v1", "result": "out" } ]
    }"#,
        demo_loader(),
    )
    .await
    .unwrap();
    let array = &results[0].arrays[0];
    // The shifted window reads 1981 data (t = 12..17) but reports the
    // original 1980 coordinates.
    assert_eq!(array.shape[0], 6);
    assert_eq!(array.values[0], 120000.0);
    let first = &array.coords[0].values[0];
    assert_eq!(format!("{first}"), "1980-01-01T00:00:00");
}

#[tokio::test]
async fn test_composite_decomposition_chain() {
    let results = run(
        r#"{
        "input": [ { "uri": "collection://merra2", "name": "tas:v1" } ],
        "operation": [
            { "name": "decomp.corcov", "input": "v1", "result": "anom" },
            { "name": "decomp.eigen", "input": "anom", "result": "modes", "modes": 2 },
            { "name": "decomp.project", "input": "modes", "result": "pcs" }
        ]
    }"#,
        demo_loader(),
    )
    .await
    .unwrap();
    assert_eq!(results.len(), 1);
    let array = &results[0].arrays[0];
    // Variance map spatially integrated: scalar per input array.
    assert!(array.shape.is_empty() || array.shape.iter().all(|s| *s >= 1));
    assert_eq!(
        array.attributes.get("modes"),
        Some(&serde_json::json!(2))
    );
}

#[tokio::test]
async fn test_empty_intersection_aborts_request() {
    let err = run(
        r#"{
        "domain": [ { "name": "far", "lat": { "start": 80, "end": 85 } } ],
        "input": [ { "uri": "collection://merra2", "name": "tas:v1", "domain": "far" } ],
        "operation": [ { "name": "core.max", "input": "v1", "axis": "t" } ]
    }"#,
        demo_loader(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RequestError::EmptyIntersection { .. }));
}

#[tokio::test]
async fn test_single_worker_sinks_union_into_one_dataset() {
    let loader = demo_loader();
    loader.insert_synthetic_grid(
        "collection://merra2",
        "pr",
        vec![0.0, 30.0, 60.0],
        vec![100.0, 110.0, 120.0],
        monthly(1980, 24),
    );
    let results = run(
        r#"{
        "input": [ { "uri": "collection://merra2", "name": "tas:v1, pr:v2" } ],
        "operation": [
            { "name": "core.max", "input": "v1", "axis": "t", "result": "hi" },
            { "name": "core.min", "input": "v2", "axis": "t", "result": "lo" }
        ]
    }"#,
        loader,
    )
    .await
    .unwrap();

    // Two sink operations, one merged result under the default policy.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "core.max[hi]+core.min[lo]");
    assert_eq!(results[0].arrays.len(), 2);
    let names: Vec<&str> = results[0].arrays.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["v1", "v2"]);
}

#[tokio::test]
async fn test_unconsumed_variable_is_not_an_output() {
    let results = run(
        r#"{
        "input": [ { "uri": "collection://merra2", "name": "tas:v1, tas:v2" } ],
        "operation": [ { "name": "core.max", "input": "v1", "axis": "t", "result": "peak" } ]
    }"#,
        demo_loader(),
    )
    .await
    .unwrap();

    // v2 is declared but never consumed; only the operation sink remains.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "core.max[peak]");
    assert_eq!(results[0].arrays.len(), 1);
    assert_eq!(results[0].arrays[0].name, "v1");
}

#[tokio::test]
async fn test_runner_requires_a_loader() {
    let schema = parse_request(
        r#"{ "operation": [ { "name": "core.noop", "input": "" } ] }"#,
        RequestFormat::Json,
    )
    .unwrap();
    assert!(matches!(
        RequestRunner::builder(schema).build(),
        Err(RequestError::ConfigError(_))
    ));
}
