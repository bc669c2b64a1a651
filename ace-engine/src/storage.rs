//! 快照持久化辅助
//!
//! 以 JSON 文件保存/加载 Playbook 快照。是否持久化、持久化到哪里
//! 由调用方决定；Engine 只提供快照契约的文件实现。

use crate::playbook::Playbook;
use crate::playbook::PlaybookSnapshot;
use anyhow::Context;
use anyhow::Result;
use std::path::Path;
use std::path::PathBuf;
use tokio::fs;

/// 快照文件存储
///
/// Responsible for snapshot persistence and loading under a base directory.
pub struct SnapshotStore {
    /// 快照文件路径
    snapshot_path: PathBuf,
}

impl SnapshotStore {
    /// Create new store
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        Ok(Self {
            snapshot_path: base_path.join("playbook.json"),
        })
    }

    /// 加载快照；文件不存在时返回空快照
    pub async fn load(&self) -> Result<PlaybookSnapshot> {
        if !self.snapshot_path.exists() {
            return Ok(PlaybookSnapshot::default());
        }

        let content = fs::read_to_string(&self.snapshot_path)
            .await
            .context("failed to read snapshot file")?;

        let snapshot: PlaybookSnapshot =
            serde_json::from_str(&content).context("failed to parse snapshot JSON")?;

        tracing::debug!(bullets = snapshot.len(), "loaded playbook snapshot");
        Ok(snapshot)
    }

    /// 保存快照（pretty JSON）
    pub async fn save(&self, snapshot: &PlaybookSnapshot) -> Result<()> {
        let json =
            serde_json::to_string_pretty(snapshot).context("failed to serialize snapshot")?;

        fs::write(&self.snapshot_path, json)
            .await
            .context("failed to write snapshot file")?;

        tracing::debug!(bullets = snapshot.len(), "saved playbook snapshot");
        Ok(())
    }

    /// 加载并还原 Playbook（文件不存在时返回空 Playbook）
    pub async fn load_playbook(&self) -> Result<Playbook> {
        let snapshot = self.load().await?;
        Playbook::from_snapshot(&snapshot).context("failed to restore playbook from snapshot")
    }

    /// 导出并保存 Playbook 快照
    pub async fn save_playbook(&self, playbook: &Playbook) -> Result<()> {
        self.save(&playbook.export_snapshot()).await
    }
}
