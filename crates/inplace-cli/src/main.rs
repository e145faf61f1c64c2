//! `inplace` binary entrypoint.

use std::process;

#[tokio::main]
async fn main() {
    let exit_code = inplace_cli::run().await;
    process::exit(exit_code);
}
