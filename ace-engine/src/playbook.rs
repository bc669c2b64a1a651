//! Playbook - bullet 的有序知识库
//!
//! Playbook 是 Engine 的核心存储单元：一个按插入顺序维护的
//! bullet id → Bullet 映射，只通过 `apply_delta` 和 `tag_bullet` 变更。
//! id 由内部计数器铸造，生命周期内永不复用（删除后墓碑化）。

use crate::error::EngineError;
use crate::error::Result;
use chrono::DateTime;
use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Tag（固定标签词汇表）
// ============================================================================

/// bullet 标签
///
/// 标签只做集合并集，不覆盖：重复打同一标签是幂等操作。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// 对生成有帮助
    Helpful,

    /// 对生成有害（误导）
    Harmful,

    /// 中性
    Neutral,

    /// 已过时
    Outdated,
}

impl Tag {
    /// 固定标签词汇表
    pub const ALL: [Tag; 4] = [Tag::Helpful, Tag::Harmful, Tag::Neutral, Tag::Outdated];

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Helpful => "helpful",
            Tag::Harmful => "harmful",
            Tag::Neutral => "neutral",
            Tag::Outdated => "outdated",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Bullet（核心存储单元）
// ============================================================================

/// 一条独立的策略/知识点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    /// 唯一标识符（由 Playbook 计数器铸造，形如 `b7`）
    pub id: String,

    /// 具体内容
    pub content: String,

    /// 标签集合（BTreeSet 保证序列化顺序稳定）
    pub tags: BTreeSet<Tag>,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 最后更新时间
    pub updated_at: DateTime<Utc>,
}

impl Bullet {
    fn new(id: String, content: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            content,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }
}

// ============================================================================
// Delta（原子变更批次）
// ============================================================================

/// 对单条 bullet 的内容更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletUpdate {
    /// 目标 bullet id
    pub id: String,

    /// 替换后的内容
    pub content: String,
}

/// 一个原子变更批次：新增、更新、删除
///
/// 校验先于任何变更执行；任何一项不合法则整个 Delta 被拒绝，
/// Playbook 保持原样。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    /// 新增 bullet 的内容列表（id 由 Playbook 铸造）
    #[serde(default)]
    pub add: Vec<String>,

    /// 内容就地替换
    #[serde(default)]
    pub update: Vec<BulletUpdate>,

    /// 待删除的 bullet id
    #[serde(default)]
    pub remove: Vec<String>,
}

impl Delta {
    /// 是否为空（无任何变更）
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

/// Curator 输出：Delta 加上变更理由
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratorOutput {
    /// 结构化变更批次
    pub delta: Delta,

    /// 变更理由（便于审计）
    pub rationale: String,
}

// ============================================================================
// 统计与快照
// ============================================================================

/// Playbook 统计信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookStats {
    /// bullet 总数
    pub total_bullets: usize,

    /// 每个标签下的 bullet 数（同一 bullet 在单个标签内只计一次）
    pub tag_counts: BTreeMap<Tag, usize>,
}

impl PlaybookStats {
    /// 持有指定标签的 bullet 数
    pub fn count(&self, tag: Tag) -> usize {
        self.tag_counts.get(&tag).copied().unwrap_or(0)
    }
}

/// 快照中的单条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletRecord {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
}

/// Playbook 快照：有序的 `{id, content, tags}` 记录列表
///
/// 导出后立即导入必须还原等价的 Playbook（相同的 id → 内容与标签映射，
/// 且保持插入顺序）。持久化到何处由调用方负责。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookSnapshot {
    pub bullets: Vec<BulletRecord>,
}

impl PlaybookSnapshot {
    pub fn len(&self) -> usize {
        self.bullets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }
}

// ============================================================================
// Playbook
// ============================================================================

/// bullet 的有序知识库
///
/// 单一变更所有者模型：内部无锁，假定同一时刻只有一个 Adapter 持有
/// 可变引用。并发场景下每个 Adapter 使用独立的 Playbook 实例。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    /// 版本号（每次成功变更递增）
    version: u32,

    /// id 铸造计数器（单调递增，删除不回退）
    next_id: u64,

    /// 所有 bullets，插入顺序即序列化顺序
    bullets: IndexMap<String, Bullet>,
}

impl Playbook {
    /// 创建空 playbook
    pub fn new() -> Self {
        Self {
            version: 1,
            next_id: 1,
            bullets: IndexMap::new(),
        }
    }

    /// 铸造一个新的唯一 id
    fn mint_id(&mut self) -> String {
        let id = format!("b{}", self.next_id);
        self.next_id += 1;
        id
    }

    /// 应用一个 Delta（全有或全无）
    ///
    /// 校验阶段：所有 `update`/`remove` 引用的 id 必须存在，
    /// 所有新增/更新内容必须非空。任何一项失败都返回
    /// [`EngineError::Validation`] 且不做任何变更。
    ///
    /// 成功时：先删除（id 墓碑化，永不复用），再就地更新，
    /// 最后按提交顺序追加新增项并铸造新 id。返回新版本号。
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<u32> {
        if delta.is_empty() {
            tracing::debug!("delta is empty, nothing to apply");
            return Ok(self.version);
        }

        // 校验先行
        let mut missing: Vec<&str> = Vec::new();
        for update in &delta.update {
            if !self.bullets.contains_key(&update.id) {
                missing.push(&update.id);
            }
        }
        for id in &delta.remove {
            if !self.bullets.contains_key(id.as_str()) {
                missing.push(id);
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::Validation(format!(
                "delta references unknown bullet ids: {}",
                missing.join(", ")
            )));
        }
        for update in &delta.update {
            if update.content.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "update for bullet {} has empty content",
                    update.id
                )));
            }
        }
        for content in &delta.add {
            if content.trim().is_empty() {
                return Err(EngineError::Validation(
                    "added bullet has empty content".to_string(),
                ));
            }
        }

        // 1. 删除（保持剩余 bullets 的插入顺序）
        for id in &delta.remove {
            self.bullets.shift_remove(id.as_str());
        }

        // 2. 就地更新
        let now = Utc::now();
        for update in &delta.update {
            if let Some(bullet) = self.bullets.get_mut(&update.id) {
                bullet.content = update.content.clone();
                bullet.updated_at = now;
            }
        }

        // 3. 按提交顺序追加新增项
        for content in &delta.add {
            let id = self.mint_id();
            self.bullets
                .insert(id.clone(), Bullet::new(id, content.clone()));
        }

        self.version += 1;
        tracing::info!(
            added = delta.add.len(),
            updated = delta.update.len(),
            removed = delta.remove.len(),
            version = self.version,
            "applied delta"
        );
        Ok(self.version)
    }

    /// 为指定 bullet 打标签（集合并集，幂等）
    ///
    /// id 不存在时返回 [`EngineError::NotFound`]。
    pub fn tag_bullet(&mut self, id: &str, tag: Tag) -> Result<()> {
        let bullet = self
            .bullets
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if bullet.tags.insert(tag) {
            bullet.updated_at = Utc::now();
            self.version += 1;
            tracing::debug!(bullet_id = id, tag = %tag, "tagged bullet");
        }
        Ok(())
    }

    /// 确定性文本序列化（Generator/Reflector 的条件上下文）
    ///
    /// 按插入顺序输出 id、内容和标签。相同内部状态下输出逐字节一致：
    /// 不含时间戳，不含任何随机成分。
    pub fn as_prompt(&self) -> String {
        if self.bullets.is_empty() {
            return "(playbook is empty)".to_string();
        }

        let mut output = String::from("## Strategy Playbook\n");
        for bullet in self.bullets.values() {
            if bullet.tags.is_empty() {
                output.push_str(&format!("- [{}] {}\n", bullet.id, bullet.content));
            } else {
                let tags: Vec<&str> = bullet.tags.iter().copied().map(Tag::as_str).collect();
                output.push_str(&format!(
                    "- [{}] {} (tags: {})\n",
                    bullet.id,
                    bullet.content,
                    tags.join(", ")
                ));
            }
        }
        output
    }

    /// 统计信息：总数 + 每标签计数
    pub fn stats(&self) -> PlaybookStats {
        let mut tag_counts: BTreeMap<Tag, usize> = BTreeMap::new();
        for tag in Tag::ALL {
            tag_counts.insert(tag, 0);
        }
        for bullet in self.bullets.values() {
            // tags 是集合，同一 bullet 在单个标签内天然只计一次
            for tag in &bullet.tags {
                *tag_counts.entry(*tag).or_insert(0) += 1;
            }
        }
        PlaybookStats {
            total_bullets: self.bullets.len(),
            tag_counts,
        }
    }

    /// 导出快照（插入顺序保持）
    pub fn export_snapshot(&self) -> PlaybookSnapshot {
        PlaybookSnapshot {
            bullets: self
                .bullets
                .values()
                .map(|bullet| BulletRecord {
                    id: bullet.id.clone(),
                    content: bullet.content.clone(),
                    tags: bullet.tags.clone(),
                })
                .collect(),
        }
    }

    /// 从快照还原 Playbook
    ///
    /// 校验 id 唯一、内容非空。id 计数器恢复到所有已铸造 `b{n}`
    /// 形式 id 的最大值之上，保证后续新 id 不与历史 id 冲突。
    pub fn from_snapshot(snapshot: &PlaybookSnapshot) -> Result<Self> {
        let mut bullets = IndexMap::with_capacity(snapshot.bullets.len());
        let mut next_id: u64 = 1;
        let now = Utc::now();

        for record in &snapshot.bullets {
            if record.content.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "snapshot bullet {} has empty content",
                    record.id
                )));
            }
            if bullets.contains_key(&record.id) {
                return Err(EngineError::Validation(format!(
                    "snapshot contains duplicate bullet id: {}",
                    record.id
                )));
            }
            if let Some(n) = record
                .id
                .strip_prefix('b')
                .and_then(|rest| rest.parse::<u64>().ok())
            {
                next_id = next_id.max(n + 1);
            }
            bullets.insert(
                record.id.clone(),
                Bullet {
                    id: record.id.clone(),
                    content: record.content.clone(),
                    tags: record.tags.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        Ok(Self {
            version: 1,
            next_id,
            bullets,
        })
    }

    /// 当前版本号
    pub fn version(&self) -> u32 {
        self.version
    }

    /// bullet 总数
    pub fn len(&self) -> usize {
        self.bullets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }

    /// 按 id 查找 bullet
    pub fn get(&self, id: &str) -> Option<&Bullet> {
        self.bullets.get(id)
    }

    /// id 是否存在
    pub fn contains(&self, id: &str) -> bool {
        self.bullets.contains_key(id)
    }

    /// 按插入顺序遍历所有 bullets
    pub fn iter(&self) -> impl Iterator<Item = &Bullet> {
        self.bullets.values()
    }
}

impl Default for Playbook {
    fn default() -> Self {
        Self::new()
    }
}
