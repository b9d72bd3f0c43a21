use std::sync::Arc;

use gridflow::dsl::{parse_request, RequestFormat};
use gridflow::loader::MemoryLoader;
use gridflow::RequestRunner;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Gridflow Request Engine ===\n");

    let json = r#"{
        "name": "demo",
        "project": "cip",
        "experiment": "merra2-demo",
        "domain": [
            { "name": "d0",
              "lat": { "start": 0, "end": 60 },
              "time": { "start": "1980-01-01", "end": "1980-12-01" } }
        ],
        "input": [
            { "uri": "collection://merra2", "name": "tas:v1", "domain": "d0" }
        ],
        "operation": [
            { "name": "core.average", "input": "v1", "axis": "xy", "result": "mean" },
            { "name": "core.max", "input": "mean", "axis": "t", "result": "peak" }
        ]
    }"#;

    let schema = parse_request(json, RequestFormat::Json).expect("failed to parse request");
    println!(
        "[OK] request parsed ({} domains, {} inputs, {} operations)",
        schema.domain.len(),
        schema.input.len(),
        schema.operation.len()
    );

    let loader = MemoryLoader::new();
    loader.insert_synthetic_grid(
        "collection://merra2",
        "tas",
        (0..7).map(|i| i as f64 * 10.0).collect(),
        (0..12).map(|i| 100.0 + i as f64 * 5.0).collect(),
        (1..=12).map(|m| format!("1980-{m:02}-01T00:00:00")).collect(),
    );

    let runner = RequestRunner::builder(schema)
        .loader(Arc::new(loader))
        .build()
        .expect("failed to configure runner");

    match runner.run().await {
        Ok(results) => {
            println!("\n=== Request completed ===");
            for dataset in &results {
                for array in &dataset.arrays {
                    println!(
                        "  {} :: {} shape {:?} first {:?}",
                        dataset.id,
                        array.name,
                        array.shape,
                        array.values.first()
                    );
                }
            }
        }
        Err(error) => {
            println!("\n=== Request failed: {error} ===");
        }
    }
}
