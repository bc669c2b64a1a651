//! Adapter - 每个样本一次完整循环的编排器
//!
//! 数据流（严格顺序，每个阶段依赖上一阶段的输出）：
//! 1. Generator 生成候选答案
//! 2. TaskEnvironment 评估
//! 3. Reflector 批评
//! 4. 应用标签提案（未知 id 静默丢弃）
//! 5. 反思入窗（FIFO，超容淘汰最旧）
//! 6. Curator 生成 delta
//! 7. Playbook 原子应用 delta
//! 8. 汇总返回 AdapterStepResult
//!
//! Adapter 是唯一持有跨循环状态的组件：当前 Playbook 和有界反思窗口。

use crate::error::EngineError;
use crate::error::Result;
use crate::playbook::Playbook;
use crate::roles::Curator;
use crate::roles::Generator;
use crate::roles::Reflector;
use crate::roles::TaskEnvironment;
use crate::types::AdapterStepResult;
use crate::types::EngineConfig;
use crate::types::Sample;
use crate::types::truncate_for_log;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// 反思窗口
// ============================================================================

/// 固定容量的反思历史（FIFO）
///
/// 保存最近 N 条序列化反思；插入超容时淘汰最旧一条。
#[derive(Debug, Clone)]
pub struct ReflectionWindow {
    capacity: usize,
    entries: VecDeque<String>,
}

impl ReflectionWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// 插入一条反思；超容时淘汰最旧
    pub fn push(&mut self, entry: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// 窗口内容（最旧在前）
    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// 循环编排器
///
/// 持有 Playbook 实例、有界反思窗口和四个注入的角色。
/// `run_step` 接收 `&mut self`：同一 Playbook 同一时刻只有一个变更者，
/// 多个 Adapter 并发运行时各自使用独立的 Playbook。
pub struct Adapter {
    session_id: String,
    playbook: Playbook,
    reflections: ReflectionWindow,
    generator: Arc<dyn Generator>,
    environment: Arc<dyn TaskEnvironment>,
    reflector: Arc<dyn Reflector>,
    curator: Arc<dyn Curator>,
}

impl Adapter {
    /// 以空 Playbook 创建 Adapter
    pub fn new(
        config: &EngineConfig,
        generator: Arc<dyn Generator>,
        environment: Arc<dyn TaskEnvironment>,
        reflector: Arc<dyn Reflector>,
        curator: Arc<dyn Curator>,
    ) -> Self {
        Self::with_playbook(
            config,
            Playbook::new(),
            generator,
            environment,
            reflector,
            curator,
        )
    }

    /// 以已有 Playbook（例如从快照还原）创建 Adapter
    pub fn with_playbook(
        config: &EngineConfig,
        playbook: Playbook,
        generator: Arc<dyn Generator>,
        environment: Arc<dyn TaskEnvironment>,
        reflector: Arc<dyn Reflector>,
        curator: Arc<dyn Curator>,
    ) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            session_id = %session_id,
            bullets = playbook.len(),
            window = config.reflection_window,
            "creating adapter"
        );
        Self {
            session_id,
            playbook,
            reflections: ReflectionWindow::new(config.reflection_window),
            generator,
            environment,
            reflector,
            curator,
        }
    }

    /// 执行一次完整 step
    ///
    /// `progress` 是归一化样本进度（[0, 1]），原样传给 Curator。
    ///
    /// 错误语义：
    /// - 角色调用失败以 [`EngineError::ExternalService`] 中止 step；
    /// - 越界指标视为评分服务响应非法，同样中止 step；
    /// - 引用未知 id 的标签提案被静默丢弃，不中止 step；
    /// - Curator 失败时，阶段 4 已应用的标签保留在 Playbook 中
    ///   （沿用原始系统的顺序语义，不做回滚）。
    ///
    /// 取消语义：唯一的挂起点是四次角色调用的 await。在 Reflector
    /// 返回之前取消不会留下任何 Playbook 变更；在 Curator 调用期间
    /// 取消则可能观察到阶段 4 的标签，与 Curator 失败的语义一致。
    pub async fn run_step(&mut self, sample: &Sample, progress: f64) -> Result<AdapterStepResult> {
        let start = Instant::now();
        tracing::info!(
            session_id = %self.session_id,
            question = %truncate_for_log(&sample.question, 80),
            progress,
            "starting adapter step"
        );

        // 1. Generator
        let playbook_prompt = self.playbook.as_prompt();
        let window = self.reflections.to_vec();
        let generator_output = self
            .generator
            .generate(&sample.question, &sample.context, &playbook_prompt, &window)
            .await?;
        tracing::debug!(
            claimed_bullets = generator_output.bullet_ids.len(),
            "generator produced candidate answer"
        );

        // 2. TaskEnvironment 评估；越界指标是评分服务的契约违规
        let environment_result = self
            .environment
            .evaluate(sample, &generator_output)
            .await?;
        environment_result
            .metrics
            .validate()
            .map_err(|err| EngineError::external("task_environment", err))?;

        // 3. Reflector 批评
        let reflection = self
            .reflector
            .reflect(
                &sample.question,
                &generator_output,
                &playbook_prompt,
                sample.ground_truth.as_deref(),
                &environment_result.feedback,
            )
            .await?;

        // 4. 应用标签提案；未知 id 直接丢弃，保持对噪声批评的鲁棒性
        let mut applied = 0usize;
        let mut dropped = 0usize;
        for proposal in &reflection.bullet_tags {
            match self.playbook.tag_bullet(&proposal.id, proposal.tag) {
                Ok(()) => applied += 1,
                Err(err) if err.is_not_found() => {
                    dropped += 1;
                    tracing::debug!(
                        bullet_id = %proposal.id,
                        "dropping tag proposal for unknown bullet"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        if dropped > 0 {
            tracing::warn!(applied, dropped, "some tag proposals referenced unknown bullets");
        }

        // 5. 反思入窗
        let serialized = serde_json::to_string(&reflection).map_err(|err| {
            EngineError::Validation(format!("failed to serialize reflection: {err}"))
        })?;
        self.reflections.push(serialized);

        // 6. Curator 生成 delta（看到的是已打标签的 playbook）
        let curator_output = self
            .curator
            .curate(
                &reflection,
                &self.playbook.as_prompt(),
                &sample.question_context(),
                progress,
            )
            .await?;

        // 7. 原子应用 delta
        let playbook_version = self.playbook.apply_delta(&curator_output.delta)?;

        // 8. 汇总
        let result = AdapterStepResult {
            sample: sample.clone(),
            generator_output,
            environment_result,
            reflection,
            curator_output,
            playbook_snapshot: self.playbook.export_snapshot(),
            playbook_version,
            session_id: self.session_id.clone(),
            completed_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            session_id = %self.session_id,
            version = playbook_version,
            bullets = self.playbook.len(),
            duration_ms = result.duration_ms,
            "adapter step completed"
        );
        Ok(result)
    }

    /// 当前 Playbook（只读）
    pub fn playbook(&self) -> &Playbook {
        &self.playbook
    }

    /// 当前反思窗口（只读）
    pub fn reflection_window(&self) -> &ReflectionWindow {
        &self.reflections
    }

    /// 会话 ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
