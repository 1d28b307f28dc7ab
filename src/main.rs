#[tokio::main]
async fn main() {
    if let Err(e) = riskwatch_lib::run().await {
        tracing::error!(error = %e, "RiskWatch failed");
        eprintln!("riskwatch: {e}");
        std::process::exit(1);
    }
}
