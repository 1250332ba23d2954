use astrond::observability::logging::{self, error_chain};
use astrond::{cli, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(e) = logging::init_logging(args.log_level) {
        eprintln!("astrond: failed to initialise logging: {e}");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = %args.config.display(), "astrond starting");

    if let Err(err) = run(args).await {
        tracing::error!(error = %error_chain(&err), "astrond exiting");
        std::process::exit(1);
    }
}
