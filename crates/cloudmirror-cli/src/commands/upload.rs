//! Upload command - copy a local file or tree into a remote folder

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use cloudmirror_transfer::{TransferEngine, TransferReport};
use tracing::info;

#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Local file or directory to upload
    #[arg(long)]
    pub local: PathBuf,

    /// Remote destination folder, ending in '/' (e.g. /backups/)
    #[arg(long)]
    pub remote: String,
}

impl UploadCommand {
    pub async fn execute(&self, engine: &TransferEngine) -> Result<TransferReport> {
        info!(local = %self.local.display(), remote = %self.remote, "Starting upload");
        engine
            .upload(&self.local, &self.remote)
            .await
            .with_context(|| format!("Upload of {} failed", self.local.display()))
    }
}
