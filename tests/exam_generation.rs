mod common;

use std::path::Path;
use std::sync::Arc;

use common::{index_with, BagOfWordsEmbedder, ScriptedChat};
use exam_generator::config::Config;
use exam_generator::infrastructure::ChatModel;
use exam_generator::models::{Difficulty, ExamGenerationRequest, MixPolicy, SectionNormalizer};
use exam_generator::orchestrator::{write_exam, ExamBuilder};
use exam_generator::services::{
    distribute_marks, ExampleRetriever, QuestionCritic, QuestionGenerator, WarnWriter,
};
use exam_generator::workflow::SlotFlow;

fn builder(chat: &Arc<ScriptedChat>, warn_file: &Path, retriever: Option<ExampleRetriever>) -> ExamBuilder {
    let config = Config::default();
    let normalizer = Arc::new(SectionNormalizer::new());
    let chat: Arc<dyn ChatModel> = chat.clone();
    let flow = SlotFlow::new(
        QuestionGenerator::new(chat.clone(), normalizer.clone(), &config),
        QuestionCritic::new(chat, &config),
        WarnWriter::with_path(warn_file.to_string_lossy()),
    );
    ExamBuilder::new(flow, retriever, normalizer, MixPolicy::default())
        .with_institution("Queen's University", "Faculty of Engineering")
}

fn request(sections: &[&str], num_questions: usize, iterations: usize) -> ExamGenerationRequest {
    ExamGenerationRequest {
        course: "APSC 142".to_string(),
        target_marks: 100,
        difficulty: Difficulty::Hard,
        num_questions: Some(num_questions),
        sections: sections.iter().map(|s| s.to_string()).collect(),
        style_examples_count: 5,
        iterations,
    }
}

#[tokio::test]
async fn test_two_hard_slots_sum_to_target() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(ScriptedChat::new());
    let builder = builder(&chat, &dir.path().join("warn.txt"), None);

    let build = builder
        .build(&request(&["Functions", "1-D Array"], 2, 2))
        .await
        .unwrap();

    let exam = &build.exam;
    assert_eq!(exam.questions.len(), 2);
    assert_eq!(exam.total_marks(), 100);
    assert_eq!(exam.questions[0].section, "Functions");
    assert_eq!(exam.questions[1].section, "1D Arrays");
    assert_eq!(exam.questions[0].question_number, "1");
    assert!(exam.questions.iter().all(|q| q.is_generated));
    assert_eq!(exam.exam_metadata.course, "APSC 142");
    assert_eq!(exam.exam_metadata.duration.as_deref(), Some("3 hours"));

    // 高难度对应最高的采样温度
    let prompts = chat.generation_prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts.iter().all(|p| (p.temperature - 0.9).abs() < 1e-6));

    assert!(build.evaluation.mark_distribution_ok);
    assert!(build.evaluation.exam_approved);
    assert_eq!(build.failed_slots, 0);
}

#[tokio::test]
async fn test_rejecting_critic_still_yields_questions() {
    let dir = tempfile::tempdir().unwrap();
    let warn_file = dir.path().join("warn.txt");
    let chat = Arc::new(ScriptedChat::always_rejecting());
    let builder = builder(&chat, &warn_file, None);

    let build = builder
        .build(&request(&["Algorithms"], 1, 3))
        .await
        .unwrap();

    assert_eq!(build.exam.questions.len(), 1);
    assert_eq!(build.forced_slots, 1);
    assert_eq!(build.exam.questions[0].quality_score, Some(3.0));
    assert_eq!(chat.review_count(), 3);

    // 被打回后的重试带上了评审意见
    let prompts = chat.generation_prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].user.contains("A reviewer rejected"));
    assert!(prompts[1].user.contains("add concrete input values"));
    assert!(prompts[2].user.contains("A reviewer rejected"));

    assert!(!build.evaluation.exam_approved);
    let warn = std::fs::read_to_string(&warn_file).unwrap();
    assert!(warn.contains("超出重试次数"));
}

#[tokio::test]
async fn test_failed_slot_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let warn_file = dir.path().join("warn.txt");
    let chat = Arc::new(ScriptedChat::new());
    chat.push_generation_error();
    let builder = builder(&chat, &warn_file, None);

    let build = builder
        .build(&request(&["Functions", "2D Arrays"], 2, 1))
        .await
        .unwrap();

    assert_eq!(build.failed_slots, 1);
    assert_eq!(build.exam.questions.len(), 1);
    assert_eq!(build.exam.questions[0].section, "2D Arrays");
    assert!(std::fs::read_to_string(&warn_file).unwrap().contains("生成失败"));
}

#[tokio::test]
async fn test_all_slots_failing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(ScriptedChat::new());
    chat.push_generation_error();
    let builder = builder(&chat, &dir.path().join("warn.txt"), None);

    assert!(builder.build(&request(&["Functions"], 1, 1)).await.is_err());
}

#[tokio::test]
async fn test_examples_reach_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let index = index_with(
        &dir.path().join("index.json"),
        &[
            ("exam_0_q_0", "Functions", "Write a function that returns the larger of two ints"),
            ("exam_0_q_1", "Function", "Write a function computing factorial"),
            ("exam_1_q_0", "Robot Programming", "Make the robot turn left"),
        ],
    );
    let retriever = ExampleRetriever::new(
        Arc::new(BagOfWordsEmbedder),
        Arc::new(index),
        Arc::new(SectionNormalizer::new()),
        40,
    );
    let chat = Arc::new(ScriptedChat::new());
    let builder = builder(&chat, &dir.path().join("warn.txt"), Some(retriever));

    let build = builder
        .build(&request(&["Functions"], 1, 1))
        .await
        .unwrap();

    let prompt = &chat.generation_prompts()[0];
    assert!(prompt.user.contains("Examples from the same section"));
    assert!(prompt.user.contains("Write a NEW question"));
    let ids = build.exam.exam_metadata.source_ids.clone().unwrap();
    assert!(ids.contains(&"exam_0_q_0".to_string()));

    let out = dir.path().join("out").join("exam.json");
    write_exam(&build.exam, &out).await.unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["questions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sections_fall_back_to_index_counts() {
    let dir = tempfile::tempdir().unwrap();
    let index = index_with(
        &dir.path().join("index.json"),
        &[
            ("a", "2D Arrays", "Transpose a matrix"),
            ("b", "2D Array", "Sum each row"),
            ("c", "Functions", "Write max()"),
        ],
    );
    let retriever = ExampleRetriever::new(
        Arc::new(BagOfWordsEmbedder),
        Arc::new(index),
        Arc::new(SectionNormalizer::new()),
        40,
    );
    let chat = Arc::new(ScriptedChat::new());
    let builder = builder(&chat, &dir.path().join("warn.txt"), Some(retriever));

    let sections = builder.resolve_sections(&ExamGenerationRequest::default());
    assert_eq!(sections, vec!["2D Arrays", "Functions"]);
}

#[test]
fn test_distribute_marks_sums_to_total() {
    for (total, slots) in [(100, 2), (100, 7), (45, 4), (3, 5)] {
        let marks = distribute_marks(total, slots);
        assert_eq!(marks.len(), slots);
        assert_eq!(marks.iter().sum::<u32>(), total);
        let max = marks.iter().max().unwrap();
        let min = marks.iter().min().unwrap();
        assert!(max - min <= 1);
    }
}
