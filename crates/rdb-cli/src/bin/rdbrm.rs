use clap::Parser;
use rdb_cli::{Opts, cmd_rm};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    cmd_rm(&opts).await
}
