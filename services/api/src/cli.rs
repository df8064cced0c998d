use crate::demo::{run_analytics, run_demo, AnalyticsArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use tutorbridge::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "TutorBridge",
    about = "Run and demonstrate the TutorBridge tuition marketplace service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a tuition request from posting to collected commission on in-memory storage
    Demo(DemoArgs),
    /// Print the admin analytics summary for the configured backend
    Analytics(AnalyticsArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Analytics(args) => run_analytics(args).await,
    }
}
