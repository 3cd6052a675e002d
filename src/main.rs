//! heka_exporter entry point.

use heka_exporter::cli::{self, Cli};
use heka_exporter::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
