use async_trait::async_trait;

use crate::types::UploadStatus;

/// The collaborators a backup cycle drives, in call order.
///
/// Implementations own everything about the backup itself (file format,
/// storage API, connection management); the scheduler only sequences the
/// calls and decides what a failure means. Errors are opaque.
#[async_trait]
pub trait BackupPipeline: Send + Sync + 'static {
    /// Live database handle passed to [`create_full_backup`](Self::create_full_backup).
    type Client: Send + Sync;

    async fn client(&self) -> anyhow::Result<Self::Client>;

    /// Materialise a full backup and return its artifact path.
    async fn create_full_backup(&self, client: &Self::Client) -> anyhow::Result<String>;

    /// Ship `artifact` to remote storage. Returns [`UploadStatus::Skipped`]
    /// when there is nowhere to ship it.
    async fn upload(&self, artifact: &str) -> anyhow::Result<UploadStatus>;

    /// Delete every backup except the `keep` most recent.
    async fn clean_old_backups(&self, keep: usize) -> anyhow::Result<()>;
}
