use clap::Parser;
use horde::prelude::*;
use horde_demos::cli::{banner, JobBoardCli, Output};
use horde_demos::roles;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = JobBoardCli::parse();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("horde=info,jobboard=info")),
        )
        .init();

    if let Some(port) = cli.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
        info!("Serving metrics on :{port}");
    }

    let config = cli.run_config()?;
    println!("{}", banner(&config, cli.scenario));

    let scheduler = Scheduler::new(
        roles::registry(&cli.api_key)?,
        Arc::new(ReqwestClient::new()),
    );
    let scheduler = match cli.output {
        Output::Table => scheduler.sink(ConsoleSink),
        Output::Json => scheduler.sink(LogSink),
    };

    let handle = scheduler.start(config)?;
    let ctrl_c = stop_on_ctrl_c(handle.stop_handle());
    let stats = handle.wait().await?;
    ctrl_c.abort();

    if cli.output == Output::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    std::process::exit(stats.exit_code());
}
