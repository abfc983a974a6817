use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// 难度标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// 难度对应的采样温度，越难越发散
    pub fn temperature(self) -> f32 {
        match self {
            Difficulty::Easy => 0.4,
            Difficulty::Medium => 0.7,
            Difficulty::Hard => 0.9,
        }
    }

    /// 检索时附加到查询文本中的难度描述
    pub fn query_hint(self) -> &'static str {
        match self {
            Difficulty::Easy => "simple basic programming question",
            Difficulty::Medium => "programming question",
            Difficulty::Hard => "complex advanced programming question",
        }
    }

    /// 根据题目分值占整卷的比例推断难度
    pub fn from_mark_share(share: f32) -> Self {
        if share >= 0.20 {
            Difficulty::Hard
        } else if share >= 0.10 {
            Difficulty::Medium
        } else {
            Difficulty::Easy
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("未知难度: {}（可选 easy / medium / hard）", other)),
        }
    }
}

/// 图片引用：描述 + 位置信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRef {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// 页内序号（从 1 开始）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// 公式引用：原文 + 位置信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquationRef {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// 试卷元信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamMetadata {
    pub university: String,
    pub faculty: String,
    pub course: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ids: Option<Vec<String>>,
}

/// 题库中的历史题目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub question_number: String,
    pub section: String,
    #[serde(default, deserialize_with = "deserialize_marks")]
    pub marks: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_description: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub answer_choices: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub images: Vec<ImageRef>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub equations: Vec<EquationRef>,
}

/// 题库中的一份历史试卷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    #[serde(default)]
    pub exam_metadata: ExamMetadata,
    pub questions: Vec<Question>,
}

impl Exam {
    pub fn total_marks(&self) -> u32 {
        self.questions.iter().map(|q| q.marks).sum()
    }
}

/// 索引中每道题携带的元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionMetadata {
    pub exam_date: String,
    pub course: String,
    /// 原始章节标签
    pub section: String,
    /// 入库时的规范章节
    pub canonical_section: String,
    pub marks: u32,
    pub exam_total_marks: u32,
    pub relevance_score: f32,
    pub question_number: String,
    /// 题干（截断到 200 字符）
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answer_choices: Vec<String>,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f32>,
    pub is_generated: bool,
}

/// 相似度检索返回的候选题
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredQuestion {
    pub id: String,
    pub metadata: QuestionMetadata,
    /// 与查询向量的相似度（越大越相似）
    pub score: f32,
}

/// 生成的新题目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub question_number: String,
    #[serde(default)]
    pub section: String,
    #[serde(default, deserialize_with = "deserialize_marks")]
    pub marks: u32,
    #[serde(default)]
    pub text: String,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub answer_choices: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// 区分生成题与历史题
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f32>,
}

impl GeneratedQuestion {
    /// 是否可视为生成题（用于回写索引时过滤）
    pub fn looks_generated(&self) -> bool {
        self.is_generated || self.generated_date.is_some() || self.quality_score.is_some()
    }
}

/// 生成的整份试卷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedExam {
    pub exam_metadata: ExamMetadata,
    pub questions: Vec<GeneratedQuestion>,
}

impl GeneratedExam {
    pub fn total_marks(&self) -> u32 {
        self.questions.iter().map(|q| q.marks).sum()
    }
}

/// 从 PDF 中提取出的题目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedQuestion {
    pub question_number: String,
    pub question_text: String,
    pub answer_choices: Vec<String>,
    pub source_page: u32,
    pub source_file: String,
    pub images: Vec<ImageRef>,
    pub equations: Vec<EquationRef>,
}

/// 试卷生成请求
#[derive(Debug, Clone, PartialEq)]
pub struct ExamGenerationRequest {
    pub course: String,
    pub target_marks: u32,
    pub difficulty: Difficulty,
    pub num_questions: Option<usize>,
    pub sections: Vec<String>,
    pub style_examples_count: usize,
    /// 每道题最多生成几次
    pub iterations: usize,
}

impl Default for ExamGenerationRequest {
    fn default() -> Self {
        Self {
            course: String::new(),
            target_marks: 100,
            difficulty: Difficulty::Medium,
            num_questions: None,
            sections: Vec::new(),
            style_examples_count: 5,
            iterations: 2,
        }
    }
}

impl ExamGenerationRequest {
    /// 题目数量：未指定时按平均每题 15 分估算，至少 5 题
    pub fn question_count(&self) -> usize {
        self.num_questions
            .unwrap_or_else(|| (self.target_marks as usize / 15).max(5))
            .max(1)
    }
}

// ========== 反序列化辅助 ==========

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// 分值既可能是整数也可能是字符串（索引元数据里是字符串）
fn deserialize_marks<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;

    struct MarksVisitor;

    impl<'de> Visitor<'de> for MarksVisitor {
        type Value = u32;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a non-negative integer or a numeric string")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u32::try_from(value).map_err(E::custom)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u32::try_from(value).map_err(E::custom)
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value.is_finite() && value >= 0.0 {
                Ok(value.round() as u32)
            } else {
                Err(E::custom(format!("invalid marks: {}", value)))
            }
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed.parse::<u32>().map_err(E::custom)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(0)
        }
    }

    deserializer.deserialize_any(MarksVisitor)
}

fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;

    struct LabelVisitor;

    impl<'de> Visitor<'de> for LabelVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer label")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(LabelVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_accepts_loose_bank_records() {
        let json = r#"{
            "question_number": 3,
            "section": "1-D Arrays",
            "marks": "12",
            "text": "Write a function...",
            "answer_choices": null
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.question_number, "3");
        assert_eq!(q.marks, 12);
        assert!(q.answer_choices.is_empty());
        assert!(q.images.is_empty());
    }

    #[test]
    fn test_exam_total_marks() {
        let exam = Exam {
            exam_metadata: ExamMetadata::default(),
            questions: vec![
                Question {
                    marks: 10,
                    ..Default::default()
                },
                Question {
                    marks: 15,
                    ..Default::default()
                },
            ],
        };
        assert_eq!(exam.total_marks(), 25);
    }

    #[test]
    fn test_difficulty_parsing_and_temperature() {
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("extreme".parse::<Difficulty>().is_err());
        assert!(Difficulty::Hard.temperature() > Difficulty::Medium.temperature());
        assert!(Difficulty::Medium.temperature() > Difficulty::Easy.temperature());
    }

    #[test]
    fn test_difficulty_from_mark_share() {
        assert_eq!(Difficulty::from_mark_share(0.25), Difficulty::Hard);
        assert_eq!(Difficulty::from_mark_share(0.12), Difficulty::Medium);
        assert_eq!(Difficulty::from_mark_share(0.02), Difficulty::Easy);
    }

    #[test]
    fn test_question_count_defaults() {
        let request = ExamGenerationRequest::default();
        assert_eq!(request.question_count(), 6);

        let small = ExamGenerationRequest {
            target_marks: 30,
            ..Default::default()
        };
        assert_eq!(small.question_count(), 5);

        let explicit = ExamGenerationRequest {
            num_questions: Some(2),
            ..Default::default()
        };
        assert_eq!(explicit.question_count(), 2);
    }

    #[test]
    fn test_generated_question_provenance_filter() {
        let historical: GeneratedQuestion =
            serde_json::from_str(r#"{"section": "Functions", "text": "t", "marks": 5}"#).unwrap();
        assert!(!historical.looks_generated());

        let scored: GeneratedQuestion = serde_json::from_str(
            r#"{"section": "Functions", "text": "t", "quality_score": 8.0}"#,
        )
        .unwrap();
        assert!(scored.looks_generated());
    }
}
