use std::process;
use std::sync::Arc;
use clap::Parser;
use pki::config::Config;
use pki::daemon::start::start_pki_daemon;

/// The PKI server.
#[derive(clap::Parser)]
#[command(version, about = "The PKI server daemon.")]
struct Options {
    /// Override the path to the config file
    #[arg(short, long, value_name = "path")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let options = Options::parse();
    match Config::create(options.config.as_deref()) {
        Ok(config) => {
            if let Err(err) = config.init_logging() {
                eprintln!("{err}");
                process::exit(1);
            }
            if let Err(err) = start_pki_daemon(Arc::new(config), None).await {
                eprintln!("PKI server failed to start: {err}");
                process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Could not parse config: {err}");
            process::exit(1);
        }
    }
}
