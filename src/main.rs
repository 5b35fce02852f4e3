use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = relaycast::cli::Cli::parse();
    if let Err(e) = relaycast::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
