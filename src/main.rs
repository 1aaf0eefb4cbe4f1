mod cli;
mod config;
mod error;
mod model;
mod providers;
mod services;
mod store;
mod summarize;
mod sync;
mod util;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        cli::print_usage();
        return Ok(());
    };
    let rest = &args[1..];

    match command {
        "connect" => cli::handle_connect(rest).await,
        "sync" => cli::handle_sync(rest).await,
        "report" => cli::handle_report().await,
        "config" => cli::handle_config(),
        "clean" => cli::handle_clean(rest),
        "disconnect" => cli::handle_disconnect(rest),
        "--help" | "-h" | "help" => {
            cli::print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}\n");
            cli::print_usage();
            std::process::exit(2);
        }
    }
}
