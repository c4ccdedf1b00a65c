use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dontlaugh_lib::run(dontlaugh_lib::Cli::parse()).await
}
