use clap::Parser;
use rdb_cli::{Opts, cmd_test};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    cmd_test(&opts).await
}
