//! Engine 错误类型
//!
//! 错误分为三类：Playbook 自身操作的校验失败/查找失败，
//! 以及外部角色服务（Generator/Reflector/Curator/TaskEnvironment）调用失败。

use thiserror::Error;

/// Engine 统一 Result 别名
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine 错误
#[derive(Debug, Error)]
pub enum EngineError {
    /// Delta 或内容校验失败（引用了不存在的 id、内容为空等）。
    /// 失败时 Playbook 不会发生任何变更。
    #[error("validation failed: {0}")]
    Validation(String),

    /// 指定的 bullet id 不存在（`tag_bullet` 等单点操作）
    #[error("bullet not found: {0}")]
    NotFound(String),

    /// 外部角色调用失败（网络错误、超时、底层服务响应格式非法等）。
    /// 会中止当前 step 并向调用方传播。
    #[error("external service error in {role}: {message}")]
    ExternalService {
        /// 出错的角色名（generator / task_environment / reflector / curator）
        role: String,
        /// 底层错误描述
        message: String,
    },
}

impl EngineError {
    /// 构造外部服务错误的便捷方法
    pub fn external(role: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::ExternalService {
            role: role.into(),
            message: err.to_string(),
        }
    }

    /// 是否为"bullet 不存在"错误（Adapter 用于过滤无效标签提案）
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
