//! Adapter 集成测试 - 模拟多轮循环提炼 Playbook
//!
//! 用确定性的角色桩实现跑完整的
//! Generator → TaskEnvironment → Reflector → Curator 工作流。

use ace_engine::Adapter;
use ace_engine::BulletTagProposal;
use ace_engine::Curator;
use ace_engine::CuratorOutput;
use ace_engine::Delta;
use ace_engine::EngineConfig;
use ace_engine::EnvironmentResult;
use ace_engine::EvalMetrics;
use ace_engine::Generator;
use ace_engine::GeneratorOutput;
use ace_engine::Playbook;
use ace_engine::Reflection;
use ace_engine::Reflector;
use ace_engine::Result;
use ace_engine::Sample;
use ace_engine::Tag;
use ace_engine::TaskEnvironment;
use ace_engine::similarity;
use async_trait::async_trait;
use std::sync::Arc;

// ----------------------------------------------------------------------
// 确定性角色桩
// ----------------------------------------------------------------------

/// 引用所有已有 bullet 的 Generator
struct PlaybookAwareGenerator;

#[async_trait]
impl Generator for PlaybookAwareGenerator {
    async fn generate(
        &self,
        question: &str,
        _context: &str,
        playbook: &str,
        reflections: &[String],
    ) -> Result<GeneratorOutput> {
        // 从 playbook 序列化文本里解析出自己"用到"的 bullet id
        let bullet_ids: Vec<String> = playbook
            .lines()
            .filter_map(|line| {
                let start = line.find('[')? + 1;
                let end = line.find(']')?;
                (start < end).then(|| line[start..end].to_string())
            })
            .collect();

        Ok(GeneratorOutput {
            reasoning: format!(
                "considered {} bullets and {} recent reflections",
                bullet_ids.len(),
                reflections.len()
            ),
            final_answer: format!("answer: {question}"),
            bullet_ids,
        })
    }
}

/// 答案包含参考答案即满分的环境（对固定输入确定性）
struct SubstringEnvironment;

#[async_trait]
impl TaskEnvironment for SubstringEnvironment {
    async fn evaluate(
        &self,
        sample: &Sample,
        generator_output: &GeneratorOutput,
    ) -> Result<EnvironmentResult> {
        let correct = sample
            .ground_truth
            .as_deref()
            .is_some_and(|truth| generator_output.final_answer.contains(truth));
        let score = if correct { 1.0 } else { 0.0 };

        Ok(EnvironmentResult {
            feedback: if correct {
                "answer matches ground truth".to_string()
            } else {
                "answer misses ground truth".to_string()
            },
            ground_truth: sample.ground_truth.clone(),
            metrics: EvalMetrics {
                correctness: score,
                completeness: score,
                relevance: 1.0,
            },
        })
    }
}

/// 返回预设提案序列的 Reflector（每个 step 消费一组）
struct ScriptedReflector {
    proposals: Vec<BulletTagProposal>,
}

#[async_trait]
impl Reflector for ScriptedReflector {
    async fn reflect(
        &self,
        question: &str,
        _generator_output: &GeneratorOutput,
        _playbook: &str,
        _ground_truth: Option<&str>,
        feedback: &str,
    ) -> Result<Reflection> {
        Ok(Reflection {
            raw: serde_json::json!({
                "question": question,
                "feedback": feedback,
            }),
            bullet_tags: self.proposals.clone(),
        })
    }
}

/// 每个 step 新增一条固定内容的 Curator
struct AddingCurator {
    content: String,
}

#[async_trait]
impl Curator for AddingCurator {
    async fn curate(
        &self,
        _reflection: &Reflection,
        _playbook: &str,
        _question_context: &str,
        _progress: f64,
    ) -> Result<CuratorOutput> {
        Ok(CuratorOutput {
            delta: Delta {
                add: vec![self.content.clone()],
                ..Delta::default()
            },
            rationale: "capture a new strategy from this reflection".to_string(),
        })
    }
}

/// 带去重的 Curator：近重复内容改为 update，避免膨胀
struct DedupCurator {
    content: String,
}

#[async_trait]
impl Curator for DedupCurator {
    async fn curate(
        &self,
        _reflection: &Reflection,
        playbook: &str,
        _question_context: &str,
        _progress: f64,
    ) -> Result<CuratorOutput> {
        // playbook 文本中已有近似内容则不再新增
        let duplicate = playbook
            .lines()
            .any(|line| similarity::is_near_duplicate(line, &self.content, 0.85));

        let delta = if duplicate {
            Delta::default()
        } else {
            Delta {
                add: vec![self.content.clone()],
                ..Delta::default()
            }
        };
        Ok(CuratorOutput {
            delta,
            rationale: if duplicate {
                "near-duplicate content, skipping add".to_string()
            } else {
                "new content".to_string()
            },
        })
    }
}

fn seeded_playbook(contents: &[&str]) -> Playbook {
    let mut playbook = Playbook::new();
    let delta = Delta {
        add: contents.iter().map(|s| (*s).to_string()).collect(),
        ..Delta::default()
    };
    playbook.apply_delta(&delta).unwrap();
    playbook
}

// ----------------------------------------------------------------------
// 测试
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_single_step_tags_and_grows_playbook() {
    // 端到端场景：b1 被标记 helpful，Curator 新增一条 bullet
    let playbook = seeded_playbook(&["Use official GTV criteria wording"]);
    let reflector = ScriptedReflector {
        proposals: vec![BulletTagProposal {
            id: "b1".to_string(),
            tag: Tag::Helpful,
        }],
    };
    let curator = AddingCurator {
        content: "Cite specific endorsing body".to_string(),
    };

    let mut adapter = Adapter::with_playbook(
        &EngineConfig::default(),
        playbook,
        Arc::new(PlaybookAwareGenerator),
        Arc::new(SubstringEnvironment),
        Arc::new(reflector),
        Arc::new(curator),
    );

    let sample = Sample {
        ground_truth: Some("GTV".to_string()),
        ..Sample::new("Define the GTV for this case")
    };
    let result = adapter.run_step(&sample, 0.0).await.unwrap();

    // Playbook 恰好 2 条：b1 已打 helpful，新 bullet 拿到新铸造的 id
    let playbook = adapter.playbook();
    assert_eq!(playbook.len(), 2);

    let b1 = playbook.get("b1").unwrap();
    assert_eq!(b1.content, "Use official GTV criteria wording");
    assert_eq!(b1.tags.len(), 1);
    assert!(b1.has_tag(Tag::Helpful));

    let new_bullet = playbook.iter().find(|b| b.id != "b1").unwrap();
    assert_eq!(new_bullet.content, "Cite specific endorsing body");
    assert_ne!(new_bullet.id, "b1");
    assert!(new_bullet.tags.is_empty());

    // step 结果汇总了所有中间产物和最新快照
    assert_eq!(result.playbook_snapshot.len(), 2);
    assert_eq!(result.generator_output.bullet_ids, vec!["b1".to_string()]);
    assert_eq!(result.environment_result.metrics.correctness, 1.0);
    assert_eq!(result.curator_output.delta.add.len(), 1);
    assert_eq!(result.session_id, adapter.session_id());
}

#[tokio::test]
async fn test_multi_step_loop_accumulates_and_bounds_window() {
    let reflector = ScriptedReflector {
        proposals: Vec::new(),
    };
    let curator = AddingCurator {
        content: "another strategy".to_string(),
    };
    let mut adapter = Adapter::new(
        &EngineConfig::default(),
        Arc::new(PlaybookAwareGenerator),
        Arc::new(SubstringEnvironment),
        Arc::new(reflector),
        Arc::new(curator),
    );

    let total = 5usize;
    for i in 0..total {
        let sample = Sample {
            ground_truth: Some("answer".to_string()),
            ..Sample::new(format!("question {i}"))
        };
        let progress = i as f64 / total as f64;
        let result = adapter.run_step(&sample, progress).await.unwrap();
        assert_eq!(result.playbook_snapshot.len(), i + 1);
    }

    // 每个 step 新增一条 bullet；窗口始终不超过默认容量 3
    assert_eq!(adapter.playbook().len(), total);
    assert_eq!(adapter.reflection_window().len(), 3);
}

#[tokio::test]
async fn test_generator_sees_tagged_playbook_next_step() {
    let reflector = ScriptedReflector {
        proposals: vec![BulletTagProposal {
            id: "b1".to_string(),
            tag: Tag::Harmful,
        }],
    };
    let curator = AddingCurator {
        content: "replacement strategy".to_string(),
    };
    let mut adapter = Adapter::with_playbook(
        &EngineConfig::default(),
        seeded_playbook(&["misleading shortcut"]),
        Arc::new(PlaybookAwareGenerator),
        Arc::new(SubstringEnvironment),
        Arc::new(reflector),
        Arc::new(curator),
    );

    adapter.run_step(&Sample::new("q1"), 0.0).await.unwrap();
    let result = adapter.run_step(&Sample::new("q2"), 0.5).await.unwrap();

    // 第二个 step 的 Generator 能看到第一步之后的全部 bullet
    assert_eq!(result.generator_output.bullet_ids.len(), 2);
    assert!(
        result
            .generator_output
            .bullet_ids
            .contains(&"b1".to_string())
    );
    assert!(adapter.playbook().get("b1").unwrap().has_tag(Tag::Harmful));
}

#[tokio::test]
async fn test_dedup_curator_keeps_playbook_compact() {
    let reflector = ScriptedReflector {
        proposals: Vec::new(),
    };
    let curator = DedupCurator {
        content: "Always verify units before computing dose".to_string(),
    };
    let mut adapter = Adapter::new(
        &EngineConfig::default(),
        Arc::new(PlaybookAwareGenerator),
        Arc::new(SubstringEnvironment),
        Arc::new(reflector),
        Arc::new(curator),
    );

    for i in 0..3 {
        adapter
            .run_step(&Sample::new(format!("q{i}")), 0.0)
            .await
            .unwrap();
    }

    // 去重 Curator 只在第一个 step 新增，后续命中近重复检测
    assert_eq!(adapter.playbook().len(), 1);
}

#[tokio::test]
async fn test_restored_playbook_continues_session() {
    // 快照导出 → 还原后继续运行，id 不冲突
    let curator = AddingCurator {
        content: "strategy".to_string(),
    };
    let mut adapter = Adapter::new(
        &EngineConfig::default(),
        Arc::new(PlaybookAwareGenerator),
        Arc::new(SubstringEnvironment),
        Arc::new(ScriptedReflector {
            proposals: Vec::new(),
        }),
        Arc::new(curator),
    );
    adapter.run_step(&Sample::new("q"), 0.0).await.unwrap();

    let snapshot = adapter.playbook().export_snapshot();
    let restored = Playbook::from_snapshot(&snapshot).unwrap();

    let mut adapter2 = Adapter::with_playbook(
        &EngineConfig::default(),
        restored,
        Arc::new(PlaybookAwareGenerator),
        Arc::new(SubstringEnvironment),
        Arc::new(ScriptedReflector {
            proposals: Vec::new(),
        }),
        Arc::new(AddingCurator {
            content: "second strategy".to_string(),
        }),
    );
    adapter2.run_step(&Sample::new("q2"), 0.0).await.unwrap();

    let ids: Vec<&str> = adapter2.playbook().iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["b1", "b2"]);
}
