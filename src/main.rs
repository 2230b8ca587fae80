use lane_console::config::{self, ConsoleMode};
use lane_console::console::{self, LiveMonitor, RoiExit};
use lane_console::recommendation::Action;
use lane_console::roi::RoiSession;
use lane_console::roi::http::HttpRoiClient;
use lane_console::stream::EventFeed;
use lane_console::stream::websocket::ConnectionManager;
use tokio::io::{AsyncBufReadExt, BufReader};

fn init_tracing(level: tracing::Level) {
    // Operator output owns stdout; logs go to stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match config::load_default() {
        Ok(config) => config,
        Err(err) => {
            init_tracing(tracing::Level::INFO);
            tracing::error!(
                config_path = config::DEFAULT_CONFIG_PATH,
                error = %err,
                "Failed to load config"
            );
            return Err(err.into());
        }
    };
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        mode = ?config.mode(),
        "lane-console starting"
    );

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if config.mode() == ConsoleMode::Roi {
        let client = HttpRoiClient::new(config.base_url(), config.request_timeout())?;
        let mut session = RoiSession::new();
        match console::run_roi(&client, &mut input, &mut session, std::io::stdout()).await? {
            RoiExit::Configured => tracing::info!("Lanes configured, switching to live monitoring"),
            RoiExit::Quit => {
                tracing::info!("ROI mapping abandoned");
                return Ok(());
            }
        }
    }

    let mut monitor = LiveMonitor::new();
    if let Some(label) = config.initial_action() {
        match label.parse::<Action>() {
            Ok(action) => monitor.select(Some(action)),
            Err(err) => tracing::warn!(error = %err, "Ignoring configured action"),
        }
    }

    let mut connection = ConnectionManager::new(config.ws_url()?);
    connection.connect()?;
    let result =
        console::run_live(&mut connection, &mut input, &mut monitor, std::io::stdout()).await;
    connection.close().await;
    result?;

    let stats = monitor.assembler().stats();
    tracing::info!(
        assembled = stats.assembled,
        malformed = stats.malformed,
        orphaned = stats.orphaned,
        superseded = stats.superseded,
        "lane-console stopped"
    );
    Ok(())
}
