// library system

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_api::accounts::{self, NewAccount};
use library_api::{app, sql, Config, ServerState};

#[derive(Parser)]
#[command(name = "library-api")]
#[command(about = "Library lending service and account management", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
	/// Run the HTTP server (default)
	Serve,

	/// Create an account; the only way to mint staff
	CreateUser {
		#[arg(short, long)]
		username: String,

		#[arg(short, long, env = "LIBRARY_PASSWORD")]
		password: String,

		#[arg(short, long, default_value = "")]
		email: String,

		/// Grant staff privilege (catalog writes, any user's penalties)
		#[arg(long)]
		staff: bool,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "library_api=debug,tower_http=debug".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let cli = Cli::parse();
	let config = Config::from_env()?;

	// set up connection pool
	let db = sql::connect(&config).await?;
	sql::migrate(&db).await?;
	tracing::info!(database = %config.database_url, "database ready");

	match cli.command {
		Some(Commands::CreateUser { username, password, email, staff }) => {
			let account = accounts::create_account(
				&db,
				NewAccount { username, email, password, is_staff: staff },
				config.bcrypt_cost,
			)
			.await?;
			println!("created user '{}' (id {})", account.username, account.id);
		}
		Some(Commands::Serve) | None => serve(db, config).await?,
	}

	Ok(())
}

async fn serve(db: sqlx::Pool<sqlx::Sqlite>, config: Config) -> anyhow::Result<()> {
	let addr = config.bind_addr.clone();
	let app = app(ServerState::new(db, config));

	let listener = tokio::net::TcpListener::bind(&addr).await?;
	tracing::info!("listening on {addr}");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	tracing::info!("server stopped");
	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!("failed to listen for ctrl-c: {e}");
		std::future::pending::<()>().await;
	}
	tracing::info!("shutdown signal received");
}
