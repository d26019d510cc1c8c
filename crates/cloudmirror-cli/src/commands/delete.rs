//! Delete command - remove a remote file or folder tree

use anyhow::{Context, Result};
use clap::Args;
use cloudmirror_transfer::{TransferEngine, TransferReport};
use tracing::info;

#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Remote file or folder to delete (folders end in '/')
    #[arg(long)]
    pub remote: String,
}

impl DeleteCommand {
    pub async fn execute(&self, engine: &TransferEngine) -> Result<TransferReport> {
        info!(remote = %self.remote, "Starting delete");
        engine
            .delete(&self.remote)
            .await
            .with_context(|| format!("Delete of {} failed", self.remote))
    }
}
