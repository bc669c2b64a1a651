//! 演示完整的 Playbook 提炼循环
//!
//! 用确定性的桩角色跑若干个 step，观察 Playbook 如何随循环演化：
//! 打标签、新增 bullet、反思窗口淘汰。

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

struct DemoGenerator;

#[async_trait]
impl Generator for DemoGenerator {
    async fn generate(
        &self,
        question: &str,
        _context: &str,
        playbook: &str,
        reflections: &[String],
    ) -> Result<GeneratorOutput> {
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
                "conditioning on {} bullets, {} reflections",
                bullet_ids.len(),
                reflections.len()
            ),
            final_answer: format!("draft answer for: {question}"),
            bullet_ids,
        })
    }
}

struct DemoEnvironment;

#[async_trait]
impl TaskEnvironment for DemoEnvironment {
    async fn evaluate(
        &self,
        sample: &Sample,
        generator_output: &GeneratorOutput,
    ) -> Result<EnvironmentResult> {
        let correct = sample
            .ground_truth
            .as_deref()
            .is_some_and(|truth| generator_output.final_answer.contains(truth));
        let score = if correct { 1.0 } else { 0.3 };
        Ok(EnvironmentResult {
            feedback: format!("correctness judged at {score}"),
            ground_truth: sample.ground_truth.clone(),
            metrics: EvalMetrics {
                correctness: score,
                completeness: score,
                relevance: 1.0,
            },
        })
    }
}

/// 给 Generator 报告引用过的每个 bullet 打 helpful 标签
struct AttributionReflector;

#[async_trait]
impl Reflector for AttributionReflector {
    async fn reflect(
        &self,
        question: &str,
        generator_output: &GeneratorOutput,
        _playbook: &str,
        _ground_truth: Option<&str>,
        feedback: &str,
    ) -> Result<Reflection> {
        let bullet_tags = generator_output
            .bullet_ids
            .iter()
            .map(|id| BulletTagProposal {
                id: id.clone(),
                tag: Tag::Helpful,
            })
            .collect();
        Ok(Reflection {
            raw: serde_json::json!({
                "question": question,
                "feedback": feedback,
                "critique": "the cited bullets pointed in the right direction",
            }),
            bullet_tags,
        })
    }
}

/// 从问题中提炼一条策略；近重复时跳过新增
struct StrategyCurator;

#[async_trait]
impl Curator for StrategyCurator {
    async fn curate(
        &self,
        _reflection: &Reflection,
        playbook: &str,
        question_context: &str,
        progress: f64,
    ) -> Result<CuratorOutput> {
        let content = format!("When asked '{question_context}', ground the answer in cited sources");
        let duplicate = playbook
            .lines()
            .any(|line| similarity::is_near_duplicate(line, &content, 0.85));

        let delta = if duplicate {
            Delta::default()
        } else {
            Delta {
                add: vec![content],
                ..Delta::default()
            }
        };
        Ok(CuratorOutput {
            delta,
            rationale: format!("progress {progress:.2}, duplicate: {duplicate}"),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== Playbook 提炼循环演示 ===\n");

    let mut playbook = Playbook::new();
    playbook.apply_delta(&Delta {
        add: vec!["Use official GTV criteria wording".to_string()],
        ..Delta::default()
    })?;

    let mut adapter = Adapter::with_playbook(
        &EngineConfig::default(),
        playbook,
        Arc::new(DemoGenerator),
        Arc::new(DemoEnvironment),
        Arc::new(AttributionReflector),
        Arc::new(StrategyCurator),
    );

    let questions = [
        "Define the GTV for a stage II lung case",
        "Which endorsing body published the criteria?",
        "Define the GTV for a stage II lung case",
        "How should margins be documented?",
    ];

    let total = questions.len();
    for (i, question) in questions.iter().enumerate() {
        let sample = Sample {
            ground_truth: Some("GTV".to_string()),
            ..Sample::new(*question)
        };
        let progress = i as f64 / total as f64;
        let result = adapter.run_step(&sample, progress).await?;

        println!("## Step {} (progress {progress:.2})", i + 1);
        println!("  answer:   {}", result.generator_output.final_answer);
        println!("  feedback: {}", result.environment_result.feedback);
        println!("  rationale: {}", result.curator_output.rationale);
        println!(
            "  playbook: {} bullets (version {})\n",
            result.playbook_snapshot.len(),
            result.playbook_version
        );
    }

    println!("=== 最终 Playbook ===\n");
    println!("{}", adapter.playbook().as_prompt());

    let stats = adapter.playbook().stats();
    println!(
        "total: {}, helpful: {}, harmful: {}",
        stats.total_bullets,
        stats.count(Tag::Helpful),
        stats.count(Tag::Harmful)
    );

    Ok(())
}
