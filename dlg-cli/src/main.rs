mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlg_auth::Strategy;

#[derive(Parser)]
#[command(name = "dlg")]
#[command(about = "Issue delegation grants and call delegated calendar actions")]
#[command(version)]
pub struct Cli {
    /// Gateway base URL
    #[arg(
        short,
        long,
        global = true,
        env = "DLG_GATEWAY_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub gateway: String,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request a grant from the gateway
    Issue {
        /// Subject the grant is for
        subject: String,

        /// Space-delimited scope set
        #[arg(short, long, default_value = "calendar.view")]
        scope: String,

        /// Lifetime in seconds (gateway default if omitted)
        #[arg(short, long)]
        ttl: Option<i64>,
    },
    /// Ask the gateway whether an artifact is valid for a scope
    Introspect {
        /// Artifact returned by `issue`
        #[arg(env = "DLG_ARTIFACT")]
        artifact: String,

        /// Scope to check
        #[arg(short, long, default_value = "calendar.view")]
        scope: String,
    },
    /// Find the next free calendar slot
    FindSlot {
        /// Artifact returned by `issue`
        #[arg(env = "DLG_ARTIFACT")]
        artifact: String,

        /// Slot length in minutes
        #[arg(short, long, default_value_t = 30)]
        duration: i64,
    },
    /// Read the current time in a timezone
    CurrentTime {
        /// Artifact returned by `issue`
        #[arg(env = "DLG_ARTIFACT")]
        artifact: String,

        /// IANA name like `Europe/Paris`, or an offset like `+09:00`
        #[arg(short, long, default_value = "UTC", allow_hyphen_values = true)]
        timezone: String,
    },
    /// Convert an HH:MM time between timezones
    ConvertTime {
        /// Artifact returned by `issue`
        #[arg(env = "DLG_ARTIFACT")]
        artifact: String,

        /// Time to convert, HH:MM (24-hour)
        #[arg(long)]
        time: String,

        /// Source timezone
        #[arg(long, default_value = "UTC", allow_hyphen_values = true)]
        from: String,

        /// Target timezone
        #[arg(long, allow_hyphen_values = true)]
        to: String,
    },
    /// Run the issue/verify/act flow in-process, without a gateway
    Demo {
        /// Grant strategy (bearer, credential)
        #[arg(long, default_value = "bearer")]
        strategy: Strategy,

        /// Subject to issue the grant for
        #[arg(long, default_value = "alice")]
        subject: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Issue {
            subject,
            scope,
            ttl,
        } => commands::execute_issue(&cli.gateway, subject, scope, ttl).await,
        Commands::Introspect { artifact, scope } => {
            commands::execute_introspect(&cli.gateway, artifact, scope).await
        }
        Commands::FindSlot { artifact, duration } => {
            commands::execute_find_slot(&cli.gateway, artifact, duration).await
        }
        Commands::CurrentTime { artifact, timezone } => {
            commands::execute_current_time(&cli.gateway, artifact, timezone).await
        }
        Commands::ConvertTime {
            artifact,
            time,
            from,
            to,
        } => commands::execute_convert_time(&cli.gateway, artifact, time, from, to).await,
        Commands::Demo { strategy, subject } => commands::run_demo(strategy, subject).await,
    }
}
