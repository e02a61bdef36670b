mod api;
mod db;
mod model;
mod password;
mod seed;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The address to bind to.
    #[arg(short, long, env = "ASSESSMATE_ADDRESS", default_value = "127.0.0.1:5000")]
    address: String,

    /// Directory holding the database and uploaded files.
    #[arg(long, env = "ASSESSMATE_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Email of the admin account created when none exists.
    #[arg(long, env = "ASSESSMATE_ADMIN_EMAIL", default_value = "admin@assessmate.com")]
    admin_email: String,

    #[arg(long, env = "ASSESSMATE_ADMIN_NAME", default_value = "Admin")]
    admin_name: String,

    #[arg(long, env = "ASSESSMATE_ADMIN_PASSWORD", default_value = "admin123")]
    admin_password: String,

    /// Lifetime of a login session.
    #[arg(long, env = "ASSESSMATE_SESSION_TTL_HOURS", default_value_t = 24)]
    session_ttl_hours: i64,

    /// Insert the default categories, subjects and topics into an empty store.
    #[arg(long, env = "ASSESSMATE_SEED_CATALOG")]
    seed_catalog: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("assessmated=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut conn = db::open_db(&args.data_dir)
        .with_context(|| format!("failed to open data dir {}", args.data_dir.display()))?;
    seed::ensure_admin(
        &conn,
        &seed::AdminAccount {
            email: &args.admin_email,
            name: &args.admin_name,
            password: &args.admin_password,
        },
    )
    .context("failed to create admin account")?;
    if args.seed_catalog {
        seed::seed_catalog(&mut conn).context("failed to seed catalog")?;
    }

    let state = api::AppState::new(
        conn,
        args.data_dir.clone(),
        chrono::Duration::hours(args.session_ttl_hours.max(1)),
    );
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.address)
        .await
        .with_context(|| format!("failed to bind {}", args.address))?;
    let local = listener.local_addr()?;
    tracing::info!(address = %local, data_dir = %args.data_dir.display(), "server started");
    {
        let mut stdout = std::io::stdout();
        writeln!(stdout, "listening on http://{local}")?;
        stdout.flush()?;
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
