use std::process;
use chrono::Utc;
use clap::Parser;
use pki::config::init_stderr_logging;
use pki::deploy::spawn::{SpawnOptions, spawn};

fn main() {
    let options = SpawnOptions::parse();
    if let Err(err) = init_stderr_logging(options.log_level()) {
        eprintln!("pkispawn: {err}");
        process::exit(-1);
    }
    match spawn(&options, Utc::now()) {
        Ok(manifest) => print!("{manifest}"),
        Err(err) => {
            eprintln!("pkispawn: {err}");
            process::exit(-1);
        }
    }
}
