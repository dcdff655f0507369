use clap::Parser;
use graphfolio::cli::{self, Cli, Commands};
use graphfolio::config::LoggingConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = cli
        .app_config()
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(&logging, cli.json);

    let result = match &cli.command {
        Commands::Train { .. } => cli::run_train(&cli).await,
        Commands::Infer { .. } => cli::run_infer(&cli).await,
        Commands::Graph => cli::run_graph(&cli).await,
        Commands::Evaluate { .. } => cli::run_evaluate(&cli).await,
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn init_logging(config: &LoggingConfig, json_output: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},graphfolio=debug", config.level))
    });

    // File logging only when a directory is configured (GRAPHFOLIO_LOG_DIR wins).
    let log_dir = std::env::var("GRAPHFOLIO_LOG_DIR")
        .ok()
        .or_else(|| config.dir.clone());

    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial file, so preflight writability.
    let file_layer = log_dir.and_then(|log_dir| {
        if std::fs::create_dir_all(&log_dir).is_err() {
            eprintln!(
                "Warning: Could not create log directory {}, file logging disabled",
                log_dir
            );
            return None;
        }

        let test_path = std::path::Path::new(&log_dir).join(".graphfolio_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, "graphfolio.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the life of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    // Logs go to stderr so `--json` results on stdout stay parseable
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if config.json || json_output {
        registry.with(console_layer.json()).init();
    } else {
        registry.with(console_layer).init();
    }
}
