use std::{env, process};
use pki::cli::options::Options;
use pki::constants::PKI_CLI_API_ENV;

fn main() {
    let options = Options::from_args();
    if options.general.api {
        // SAFETY: no other threads exist before the runtime is built.
        unsafe { env::set_var(PKI_CLI_API_ENV, "1") }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            process::exit(1);
        }
    };
    let client = options.client();
    let format = options.general.format;
    let status = runtime.block_on(async move {
        options.command.run(&client).await.report(format)
    });
    process::exit(status);
}
