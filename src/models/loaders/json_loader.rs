use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::fs;
use tracing::{info, warn};

use crate::error::FileError;
use crate::models::question::{Exam, GeneratedQuestion};

/// 加载题库 JSON（试卷数组）
///
/// 单份试卷格式错误时只记录警告并跳过，文件本身不存在或不是数组则报错。
pub async fn load_question_bank(path: &Path) -> Result<Vec<Exam>> {
    let raw = read_json(path).await?;

    let items = match raw {
        JsonValue::Array(items) => items,
        other => anyhow::bail!(
            "题库格式错误 ({}): 顶层应为数组，实际为 {}",
            path.display(),
            json_kind(&other)
        ),
    };

    let total = items.len();
    let mut exams = Vec::with_capacity(total);
    for (idx, item) in items.into_iter().enumerate() {
        match Exam::deserialize(item) {
            Ok(exam) => exams.push(exam),
            Err(e) => warn!("⚠️ 跳过第 {} 份试卷（格式错误）: {}", idx + 1, e),
        }
    }

    info!("✓ 题库加载完成: {}/{} 份试卷", exams.len(), total);
    Ok(exams)
}

/// 加载生成题文件：既可以是题目数组，也可以是带 `questions` 字段的试卷对象
pub async fn load_generated_questions(path: &Path) -> Result<Vec<GeneratedQuestion>> {
    let raw = read_json(path).await?;

    let items = match raw {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("questions") {
            Some(JsonValue::Array(items)) => items,
            _ => anyhow::bail!("文件 {} 中没有 questions 数组", path.display()),
        },
        other => anyhow::bail!(
            "生成题文件格式错误 ({}): {}",
            path.display(),
            json_kind(&other)
        ),
    };

    let mut questions = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        match GeneratedQuestion::deserialize(item) {
            Ok(q) => questions.push(q),
            Err(e) => warn!("⚠️ 跳过第 {} 道题（格式错误）: {}", idx + 1, e),
        }
    }
    Ok(questions)
}

async fn read_json(path: &Path) -> Result<JsonValue> {
    if !path.exists() {
        return Err(FileError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取JSON文件: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("无法解析JSON文件: {}", path.display()))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
