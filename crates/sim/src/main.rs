use anyhow::Context;

use stockroom_infra::RuntimeConfig;

fn main() -> anyhow::Result<()> {
    stockroom_observability::init();

    let config = RuntimeConfig::from_env().context("invalid STOCKROOM_* configuration")?;
    tracing::info!(
        receipt_workers = config.receipt_workers,
        document_workers = config.document_workers,
        line_delay = ?config.line_delay,
        receipt_policy = %config.receipt_policy,
        "starting warehouse simulation"
    );

    let summary = stockroom_sim::run(&config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
