//! ACE Engine - 自适应 Playbook 知识提炼引擎
//!
//! 在重复的 generate → evaluate → reflect → curate 循环中增量提炼
//! 一个 bullet-based 的策略知识库（Playbook）。
//!
//! 数据流（每个样本一次 step）:
//! 1. Generator 以 Playbook 和最近反思为条件生成候选答案
//! 2. TaskEnvironment 评估并返回反馈与指标
//! 3. Reflector 批评并提议 bullet 标签变更
//! 4. Curator 将反思转换为结构化 Playbook delta
//!
//! 角色实现（对接推理/评分服务）由调用方注入，Engine 只定义契约。

pub mod adapter;
pub mod error;
pub mod playbook;
pub mod roles;
pub mod similarity;
pub mod storage;
pub mod types;

pub use adapter::Adapter;
pub use adapter::ReflectionWindow;
pub use error::EngineError;
pub use error::Result;
pub use playbook::Bullet;
pub use playbook::BulletRecord;
pub use playbook::BulletUpdate;
pub use playbook::CuratorOutput;
pub use playbook::Delta;
pub use playbook::Playbook;
pub use playbook::PlaybookSnapshot;
pub use playbook::PlaybookStats;
pub use playbook::Tag;
pub use roles::Curator;
pub use roles::Generator;
pub use roles::Reflector;
pub use roles::TaskEnvironment;
pub use storage::SnapshotStore;
pub use types::AdapterStepResult;
pub use types::BulletTagProposal;
pub use types::DEFAULT_REFLECTION_WINDOW;
pub use types::EngineConfig;
pub use types::EnvironmentResult;
pub use types::EvalMetrics;
pub use types::GeneratorOutput;
pub use types::Reflection;
pub use types::Sample;
