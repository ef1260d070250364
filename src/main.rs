use archie::app::Application;
use archie::cli::Args;
use archie::config::Config;
use archie::display;
use clap::Parser;

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            display::display_error(&e.to_string());
            std::process::exit(1);
        }
    };

    let result = match Application::new(args, config).await {
        Ok(mut app) => app.run().await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        display::display_error(&e.to_string());
        std::process::exit(1);
    }
}
