//! 角色契约
//!
//! 四个可插拔角色的 trait 定义。具体实现（对接推理服务、领域评分服务）
//! 属于外部协作者，不在本 crate 范围内；Engine 只通过这些契约调用它们。
//!
//! 每次角色调用都可能是高延迟的 I/O 操作，Adapter 会逐个 await，
//! 绝不在一个 step 内重叠两次角色调用。

use crate::error::Result;
use crate::playbook::CuratorOutput;
use crate::types::EnvironmentResult;
use crate::types::GeneratorOutput;
use crate::types::Reflection;
use crate::types::Sample;
use async_trait::async_trait;

/// Generator - 产出候选答案
///
/// 以 Playbook 序列化文本和最近的反思窗口为条件上下文。
/// 对 Engine 无状态，对 Playbook 无副作用。
#[async_trait]
pub trait Generator: Send + Sync {
    /// 生成候选答案
    ///
    /// # 参数
    /// - `question`: 问题文本
    /// - `context`: 样本附加上下文
    /// - `playbook`: `Playbook::as_prompt()` 的序列化输出
    /// - `reflections`: 反思窗口内容（最旧在前）
    ///
    /// 契约：必须通过 `bullet_ids` 报告自认为引用过的 playbook 条目，
    /// 供下游归因和打标签使用。
    async fn generate(
        &self,
        question: &str,
        context: &str,
        playbook: &str,
        reflections: &[String],
    ) -> Result<GeneratorOutput>;
}

/// TaskEnvironment - 领域评分环境
///
/// 将候选答案与参考答案/评分标准对比，返回反馈和三项 [0, 1] 指标。
/// 对固定的 `(sample, generator_output)` 必须是确定性的，
/// 以支持可复现测试。
#[async_trait]
pub trait TaskEnvironment: Send + Sync {
    async fn evaluate(
        &self,
        sample: &Sample,
        generator_output: &GeneratorOutput,
    ) -> Result<EnvironmentResult>;
}

/// Reflector - 批评者
///
/// 对照环境反馈批评 Generator 输出，并提议零或多条 bullet 标签变更。
/// 提案引用不存在的 id 不是致命错误：Adapter 在应用时静默丢弃，
/// 保持循环对噪声批评的鲁棒性。
#[async_trait]
pub trait Reflector: Send + Sync {
    async fn reflect(
        &self,
        question: &str,
        generator_output: &GeneratorOutput,
        playbook: &str,
        ground_truth: Option<&str>,
        feedback: &str,
    ) -> Result<Reflection>;
}

/// Curator - Delta 的唯一授权生产者
///
/// 将一条反思转换为结构化的 Playbook 变更批次。
/// `progress`（归一化样本进度，[0, 1]）可用于前期偏探索、
/// 后期偏收敛/修剪，由实现自行决定，Engine 不强制。
///
/// 近重复内容的去重合并也是 Curator 层的决策
/// （参见 [`crate::similarity`]），Playbook 本身不做隐式合并。
#[async_trait]
pub trait Curator: Send + Sync {
    async fn curate(
        &self,
        reflection: &Reflection,
        playbook: &str,
        question_context: &str,
        progress: f64,
    ) -> Result<CuratorOutput>;
}
