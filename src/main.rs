use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use code_arena::{api, app, config, store, sweeper};

#[derive(Parser)]
#[command(name = "arena")]
#[command(about = "Competitive issue-tracking server for code competitions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the arena server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Path to the SQLite database (defaults to the platform data dir)
        #[arg(long)]
        db: Option<std::path::PathBuf>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "code_arena=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(port: u16, db_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let db = match db_path {
        Some(path) => store::Store::open(path)?,
        None => store::Store::open_default()?,
    };
    db.migrate()?;

    let arena = app::Arena::new(db)?;
    sweeper::spawn(arena.clone(), config::SWEEP_INTERVAL);

    let router = api::create_router(arena);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    tracing::info!("Arena server listening on http://127.0.0.1:{port}");

    axum::serve(listener, router).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port, db }) => serve(port, db).await?,
        None => serve(3000, None).await?,
    }

    Ok(())
}
