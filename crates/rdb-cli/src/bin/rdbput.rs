use clap::Parser;
use rdb_cli::{Opts, cmd_put};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    cmd_put(&opts).await
}
