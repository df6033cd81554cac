//! Storefront entry point: runs the scripted session and prints its report.

use app::{Config, Runtime, scenario, telemetry};

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    telemetry::init_tracing(&config).expect("failed to initialize tracing");

    // 2. Install Prometheus metrics recorder
    let metrics_handle =
        telemetry::install_metrics().expect("failed to install Prometheus recorder");

    // 3. Wire the runtime
    let runtime = Runtime::build(&config).expect("failed to build runtime");

    // 4. Run the session
    let report = scenario::run(&runtime).await.expect("scenario failed");
    tracing::info!(
        orders = report.orders.len(),
        rejected = report.rejected.len(),
        failures = report.failures.len(),
        "scenario finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&report).expect("failed to serialize report")
    );

    // 5. Shut down and dump metrics
    runtime.shutdown().await;
    println!("{}", metrics_handle.render());
}
