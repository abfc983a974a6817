//! 集成测试共用的假 LLM / 假 Embedding
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use exam_generator::error::{AppResult, LlmError};
use exam_generator::infrastructure::{ChatModel, Embedder, FlatIndex, IndexRecord, Prompt};
use exam_generator::models::{QuestionMetadata, ScoredQuestion};

const CRITIC_MARKER: &str = "Evaluate this exam question:";
const DIMENSIONS: usize = 64;

/// 按脚本回复的对话模型
///
/// 生成请求与评审请求各用一个队列；队列空了以后用默认回复。
pub struct ScriptedChat {
    generations: Mutex<VecDeque<AppResult<String>>>,
    reviews: Mutex<VecDeque<AppResult<String>>>,
    default_review: String,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self {
            generations: Mutex::new(VecDeque::new()),
            reviews: Mutex::new(VecDeque::new()),
            default_review: "Score: 8/10\nClear and well scoped.".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 所有评审都给低分
    pub fn always_rejecting() -> Self {
        Self {
            default_review: "Score: 3/10\nToo vague, add concrete input values.".to_string(),
            ..Self::new()
        }
    }

    pub fn push_generation(&self, reply: impl Into<String>) -> &Self {
        self.generations.lock().unwrap().push_back(Ok(reply.into()));
        self
    }

    pub fn push_generation_error(&self) -> &Self {
        self.generations.lock().unwrap().push_back(Err(LlmError::EmptyContent {
            model: "scripted".to_string(),
        }
        .into()));
        self
    }

    pub fn push_review(&self, reply: impl Into<String>) -> &Self {
        self.reviews.lock().unwrap().push_back(Ok(reply.into()));
        self
    }

    pub fn generation_prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !p.user.starts_with(CRITIC_MARKER))
            .cloned()
            .collect()
    }

    pub fn review_count(&self) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user.starts_with(CRITIC_MARKER))
            .count()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, prompt: &Prompt) -> AppResult<String> {
        self.prompts.lock().unwrap().push(prompt.clone());

        if prompt.user.starts_with(CRITIC_MARKER) {
            return self
                .reviews
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.default_review.clone()));
        }

        let scripted = self.generations.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(echo_question(&prompt.user)))
    }
}

/// 没有脚本时，按提示词里的章节和分值回一道题
fn echo_question(user: &str) -> String {
    let section = between(user, "for the '", "' section").unwrap_or("General");
    let marks = between(user, "worth ", " marks").unwrap_or("10");
    format!(
        "Section: {}\nMarks: {}\nText: Write a program about {} that reads five integers.",
        section, marks, section
    )
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

/// 词袋向量：每个词散列到固定维度，结果确定
pub struct BagOfWordsEmbedder;

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        Ok(bag_of_words(text))
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let slot = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
            % DIMENSIONS;
        v[slot] += 1.0;
    }
    v
}

pub fn metadata(section: &str, text: &str, marks: u32) -> QuestionMetadata {
    QuestionMetadata {
        section: section.to_string(),
        text: text.to_string(),
        marks,
        exam_total_marks: 100,
        ..Default::default()
    }
}

pub fn scored(id: &str, section: &str, score: f32) -> ScoredQuestion {
    ScoredQuestion {
        id: id.to_string(),
        metadata: metadata(section, &format!("question {}", id), 10),
        score,
    }
}

/// 在临时目录中建一个小索引
pub fn index_with(path: &std::path::Path, items: &[(&str, &str, &str)]) -> FlatIndex {
    let mut index = FlatIndex::create(path, "exam_questions");
    for (id, section, text) in items {
        let document = format!("Section: {} | Question: {}", section, text);
        index
            .add(IndexRecord {
                id: id.to_string(),
                embedding: bag_of_words(&document),
                document,
                metadata: metadata(section, text, 10),
            })
            .unwrap();
    }
    index
}
