//! `CommandPipeline`: backup collaborators backed by operator-supplied shell
//! commands.
//!
//! Every command runs via `sh -c` with its inputs passed as env vars, so the
//! configured strings never need quoting or templating:
//!
//! | Step   | Config key       | Env vars                                       |
//! |--------|------------------|------------------------------------------------|
//! | create | `create_command` | `DATABASE_URL`, `BACKUP_DIR`, `BACKUP_TIMESTAMP` |
//! | upload | `upload_command` | `BACKUP_PATH`                                  |
//! | prune  | `prune_command`  | `BACKUP_DIR`, `BACKUP_KEEP`                    |
//!
//! The create command must print the artifact path as its last stdout line.
//! Upload and prune are optional; when unset the step is skipped.

use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use backupd_core::PipelineConfig;
use backupd_scheduler::{BackupPipeline, UploadStatus};
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info};

/// Max characters of stderr carried into an error message.
const STDERR_TAIL_CHARS: usize = 500;

/// Database handle: the connection string the create command receives.
pub struct DatabaseClient {
    url: String,
}

pub struct CommandPipeline {
    config: PipelineConfig,
}

impl CommandPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run `command` under `sh -c` and return its stdout.
    ///
    /// A non-zero exit is an error carrying the tail of stderr.
    async fn run(&self, step: &str, command: &str, envs: &[(&str, String)]) -> anyhow::Result<String> {
        debug!(step, command, "running pipeline command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn {step} command"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{step} command exited with {}: {}",
                output.status,
                tail(stderr.trim(), STDERR_TAIL_CHARS)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl BackupPipeline for CommandPipeline {
    type Client = DatabaseClient;

    async fn client(&self) -> anyhow::Result<DatabaseClient> {
        let url = self
            .config
            .database_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .context("DATABASE_URL is not configured")?;
        Ok(DatabaseClient {
            url: url.to_string(),
        })
    }

    async fn create_full_backup(&self, client: &DatabaseClient) -> anyhow::Result<String> {
        let command = self
            .config
            .create_command
            .as_deref()
            .context("pipeline.create_command is not configured")?;

        tokio::fs::create_dir_all(&self.config.backup_dir)
            .await
            .with_context(|| format!("cannot create backup dir {}", self.config.backup_dir))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let stdout = self
            .run(
                "create",
                command,
                &[
                    ("DATABASE_URL", client.url.clone()),
                    ("BACKUP_DIR", self.config.backup_dir.clone()),
                    ("BACKUP_TIMESTAMP", stamp),
                ],
            )
            .await?;

        stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .context("create command printed no artifact path")
    }

    async fn upload(&self, artifact: &str) -> anyhow::Result<UploadStatus> {
        let Some(command) = self.config.upload_command.as_deref() else {
            debug!(artifact, "no upload_command configured");
            return Ok(UploadStatus::Skipped);
        };
        self.run("upload", command, &[("BACKUP_PATH", artifact.to_string())])
            .await?;
        Ok(UploadStatus::Uploaded)
    }

    async fn clean_old_backups(&self, keep: usize) -> anyhow::Result<()> {
        let Some(command) = self.config.prune_command.as_deref() else {
            info!(keep, "no prune_command configured, retention skipped");
            return Ok(());
        };
        self.run(
            "prune",
            command,
            &[
                ("BACKUP_DIR", self.config.backup_dir.clone()),
                ("BACKUP_KEEP", keep.to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}

/// Last `max_chars` characters of `s`, split on a char boundary.
fn tail(s: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    s.char_indices()
        .rev()
        .nth(max_chars - 1)
        .map(|(i, _)| &s[i..])
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(dir: &std::path::Path, create: Option<&str>) -> CommandPipeline {
        CommandPipeline::new(PipelineConfig {
            database_url: Some("postgres://backup@localhost/app".to_string()),
            backup_dir: dir.join("backups").display().to_string(),
            create_command: create.map(str::to_string),
            upload_command: None,
            prune_command: None,
        })
    }

    fn client() -> DatabaseClient {
        DatabaseClient {
            url: "postgres://backup@localhost/app".to_string(),
        }
    }

    #[tokio::test]
    async fn client_requires_database_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), None);
        p.config.database_url = Some("   ".to_string());
        let err = p.client().await.err().unwrap();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[tokio::test]
    async fn create_returns_last_stdout_line_as_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(
            dir.path(),
            Some(
                r#"f="$BACKUP_DIR/app-$BACKUP_TIMESTAMP.sql"
                echo "dumping..."
                echo "$DATABASE_URL" > "$f"
                echo "$f""#,
            ),
        );

        let artifact = p.create_full_backup(&client()).await.unwrap();
        assert!(artifact.starts_with(&p.config.backup_dir));
        assert!(artifact.ends_with(".sql"));
        let contents = std::fs::read_to_string(&artifact).unwrap();
        assert_eq!(contents.trim(), "postgres://backup@localhost/app");
    }

    #[tokio::test]
    async fn create_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), Some("echo 'pg_dump: connection refused' >&2; exit 3"));
        let err = p.create_full_backup(&client()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("create command exited"), "{msg}");
        assert!(msg.contains("connection refused"), "{msg}");
    }

    #[tokio::test]
    async fn create_without_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), Some("true"));
        let err = p.create_full_backup(&client()).await.unwrap_err();
        assert!(err.to_string().contains("no artifact path"));
    }

    #[tokio::test]
    async fn create_without_command_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), None);
        let err = p.create_full_backup(&client()).await.unwrap_err();
        assert!(err.to_string().contains("create_command"));
    }

    #[tokio::test]
    async fn upload_and_prune_receive_their_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), None);
        p.config.upload_command = Some(r#"cp "$BACKUP_PATH" "$BACKUP_PATH.uploaded""#.to_string());
        p.config.prune_command = Some(r#"echo "$BACKUP_KEEP" > "$BACKUP_DIR/keep""#.to_string());
        std::fs::create_dir_all(&p.config.backup_dir).unwrap();

        let artifact = format!("{}/nightly.sql", p.config.backup_dir);
        std::fs::write(&artifact, "dump").unwrap();

        assert_eq!(p.upload(&artifact).await.unwrap(), UploadStatus::Uploaded);
        assert!(std::path::Path::new(&format!("{artifact}.uploaded")).exists());

        p.clean_old_backups(30).await.unwrap();
        let keep = std::fs::read_to_string(format!("{}/keep", p.config.backup_dir)).unwrap();
        assert_eq!(keep.trim(), "30");
    }

    #[tokio::test]
    async fn unset_upload_and_prune_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), None);
        assert_eq!(
            p.upload("/nowhere/backup.sql").await.unwrap(),
            UploadStatus::Skipped
        );
        p.clean_old_backups(30).await.unwrap();
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("hello world", 5), "world");
        assert_eq!(tail("short", 50), "short");
        assert_eq!(tail("héllo", 4), "éllo");
        assert_eq!(tail("anything", 0), "");
    }
}
