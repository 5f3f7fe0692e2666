use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use triage_core::broadcast::EventBroadcaster;
use triage_core::config::Config;
use triage_core::logs::SampleLogStore;
use triage_core::planner::RulePlanner;
use triage_core::resilience::{CallPolicy, CircuitBreaker};
use triage_core::steps::NoopCapturer;
use triage_core::store::IncidentStore;
use triage_core::workflow::Services;

use triage_server::state::AppState;

#[derive(Parser)]
#[command(
    name = "triage-server",
    about = "Security alert intake and automated investigation service",
    version
)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "TRIAGE_PORT", default_value_t = 8080)]
    port: u16,

    /// Directory holding the record store
    #[arg(long, env = "TRIAGE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Sample log file queried by run_query steps
    #[arg(long, env = "TRIAGE_SAMPLE_LOGS", default_value = "data/sample_logs.json")]
    sample_logs: PathBuf,

    /// HMAC secret for webhook signature verification (unset disables it)
    #[arg(long, env = "TRIAGE_WEBHOOK_SECRET")]
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let config = Config::from_env();
    std::fs::create_dir_all(&cli.data_dir)?;
    let store = IncidentStore::open(&cli.data_dir.join("triage.redb"))?;

    let services = Arc::new(Services {
        store: Arc::new(store),
        broadcaster: Arc::new(EventBroadcaster::new()),
        planner: Arc::new(RulePlanner),
        logs: Arc::new(SampleLogStore::new(cli.sample_logs)),
        evidence: Arc::new(NoopCapturer),
        breaker: Arc::new(CircuitBreaker::from_config(&config.connector)),
        call_policy: CallPolicy::from(&config.connector),
        config,
    });

    if cli.webhook_secret.is_none() {
        tracing::warn!("TRIAGE_WEBHOOK_SECRET is not set; webhook signatures are not verified");
    }

    let app_state = AppState::new(services, cli.webhook_secret);
    triage_server::serve(app_state, cli.port).await
}
