//! Engine 的核心数据结构
//!
//! 定义一次 generate → evaluate → reflect → curate 循环中
//! 各角色之间传递的输入输出类型，以及 Engine 配置。

use crate::error::EngineError;
use crate::error::Result;
use crate::playbook::CuratorOutput;
use crate::playbook::PlaybookSnapshot;
use crate::playbook::Tag;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// 反思窗口默认容量
pub const DEFAULT_REFLECTION_WINDOW: usize = 3;

// ============================================================================
// Sample（一个工作单元）
// ============================================================================

/// 一条待处理的样本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// 问题文本
    pub question: String,

    /// 附加上下文（可为空字符串）
    #[serde(default)]
    pub context: String,

    /// 参考答案（如果有）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,

    /// 不透明元数据（来源、分组等，Engine 不解析）
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Sample {
    /// 创建仅含问题的样本
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: String::new(),
            ground_truth: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Curator 使用的问题上下文（问题 + 附加上下文拼接）
    pub fn question_context(&self) -> String {
        if self.context.is_empty() {
            self.question.clone()
        } else {
            format!("{}\n\n{}", self.question, self.context)
        }
    }
}

// ============================================================================
// Generator 输出
// ============================================================================

/// Generator 产出的候选答案
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorOutput {
    /// 推理过程
    pub reasoning: String,

    /// 最终答案
    pub final_answer: String,

    /// Generator 声称引用过的 bullet id（用于下游归因/打标签）
    #[serde(default)]
    pub bullet_ids: Vec<String>,
}

// ============================================================================
// TaskEnvironment 输出
// ============================================================================

/// 评估指标，三项各自限定在 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub correctness: f64,
    pub completeness: f64,
    pub relevance: f64,
}

impl EvalMetrics {
    /// 校验所有指标都在 [0, 1] 内
    ///
    /// 越界值是评分服务的契约违规，Engine 不会静默 clamp。
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("correctness", self.correctness),
            ("completeness", self.completeness),
            ("relevance", self.relevance),
        ];
        for (name, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Validation(format!(
                    "metric {name} out of range: {value}"
                )));
            }
        }
        Ok(())
    }
}

/// TaskEnvironment 的评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentResult {
    /// 文本反馈
    pub feedback: String,

    /// 评估时使用的参考答案
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,

    /// 三项评估指标
    pub metrics: EvalMetrics,
}

// ============================================================================
// Reflector 输出
// ============================================================================

/// 单条标签提案：为某个 bullet 提议一个标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletTagProposal {
    /// 目标 bullet id（可能不存在，Adapter 负责过滤）
    pub id: String,

    /// 提议的标签
    pub tag: Tag,
}

/// Reflector 产出的批评
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    /// 原始结构化批评内容（Engine 不解析）
    pub raw: serde_json::Value,

    /// 零或多条标签提案
    #[serde(default)]
    pub bullet_tags: Vec<BulletTagProposal>,
}

// ============================================================================
// Adapter step 结果
// ============================================================================

/// 一次完整 step 的全部中间产物汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterStepResult {
    /// 输入样本
    pub sample: Sample,

    /// Generator 输出
    pub generator_output: GeneratorOutput,

    /// TaskEnvironment 评估结果
    pub environment_result: EnvironmentResult,

    /// Reflector 批评
    pub reflection: Reflection,

    /// Curator 输出
    pub curator_output: CuratorOutput,

    /// step 完成后的 Playbook 快照
    pub playbook_snapshot: PlaybookSnapshot,

    /// step 完成后的 Playbook 版本号
    pub playbook_version: u32,

    /// 所属会话 ID
    pub session_id: String,

    /// 完成时间
    pub completed_at: DateTime<Utc>,

    /// step 耗时（毫秒）
    pub duration_ms: u64,
}

// ============================================================================
// 配置
// ============================================================================

/// Engine 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// 反思窗口容量（FIFO，超出即淘汰最旧）
    pub reflection_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reflection_window: DEFAULT_REFLECTION_WINDOW,
        }
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 截断字符串用于日志输出（按字符边界，避免切断多字节字符）
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
