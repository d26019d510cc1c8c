//! Download command - materialize a remote file or folder locally

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use cloudmirror_transfer::{TransferEngine, TransferReport};
use tracing::info;

#[derive(Debug, Args)]
pub struct DownloadCommand {
    /// Existing local directory to download into
    #[arg(long)]
    pub local: PathBuf,

    /// Remote file or folder (folders end in '/')
    #[arg(long)]
    pub remote: String,
}

impl DownloadCommand {
    pub async fn execute(&self, engine: &TransferEngine) -> Result<TransferReport> {
        info!(local = %self.local.display(), remote = %self.remote, "Starting download");
        engine
            .download(&self.local, &self.remote)
            .await
            .with_context(|| format!("Download of {} failed", self.remote))
    }
}
