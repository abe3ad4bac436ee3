use clap::Parser;
use rdb_cli::{Opts, cmd_ls};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    cmd_ls(&opts).await
}
