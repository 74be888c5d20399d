use std::process;
use clap::Parser;
use pki::config::init_stderr_logging;
use pki::deploy::spawn::{DestroyOptions, destroy};

fn main() {
    let options = DestroyOptions::parse();
    if let Err(err) = init_stderr_logging(options.log_level()) {
        eprintln!("pkidestroy: {err}");
        process::exit(-1);
    }
    match destroy(&options) {
        Ok(manifest) => print!("{manifest}"),
        Err(err) => {
            eprintln!("pkidestroy: {err}");
            process::exit(-1);
        }
    }
}
