use clap::Parser;
use rdb_cli::{Opts, cmd_cat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    cmd_cat(&opts).await
}
