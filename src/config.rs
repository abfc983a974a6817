//! 程序配置
//!
//! 优先级：默认值 < TOML 配置文件 < 环境变量（含 `.env`） < 命令行参数

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult, ConfigError, FileError};
use crate::models::MixPolicy;

/// 未指定时查找的默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "exam_generator.toml";

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 生成题目时单次回复的最大 token 数
    pub llm_max_tokens: u32,
    // --- Embedding 配置 ---
    pub embedding_model: String,
    // --- 向量索引 ---
    /// 索引持久化文件
    pub index_path: String,
    pub collection_name: String,
    /// 每次检索向索引请求的候选数量下限
    pub candidate_pool: usize,
    // --- 文件路径 ---
    pub question_bank_path: String,
    /// PDF 存放目录
    pub pdf_folder: String,
    /// 提取结果输出目录
    pub extraction_output_dir: String,
    /// 警告文件
    pub warn_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 生成与评审 ---
    /// 评审通过的最低分（0-10）
    pub approval_threshold: f32,
    /// 风格示例的混合比例
    pub mix: MixPolicy,
    pub course: String,
    pub university: String,
    pub faculty: String,
    // --- PDF 提取 ---
    /// 是否调用视觉模型描述图片
    pub describe_images: bool,
    /// 文本少于该字符数的页面会走 OCR
    pub ocr_min_chars: usize,
    pub ocr_language: String,
    // --- 章节表扩展 ---
    /// 额外的章节别名（原始标签 -> 规范标签）
    pub section_aliases: BTreeMap<String, String>,
    /// 额外的相关章节对
    pub related_sections: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_max_tokens: 500,
            embedding_model: "text-embedding-3-small".to_string(),
            index_path: "chroma_db/exam_questions.json".to_string(),
            collection_name: "exam_questions".to_string(),
            candidate_pool: 40,
            question_bank_path: "data/question_bank.json".to_string(),
            pdf_folder: "pdfs".to_string(),
            extraction_output_dir: "output/extracted".to_string(),
            warn_file: "warn.txt".to_string(),
            verbose_logging: false,
            approval_threshold: 7.0,
            mix: MixPolicy::default(),
            course: "APSC 142 - Introduction to Computer Programming for Engineers".to_string(),
            university: "Queen's University".to_string(),
            faculty: "Faculty of Engineering & Applied Science".to_string(),
            describe_images: true,
            ocr_min_chars: 20,
            ocr_language: "eng".to_string(),
            section_aliases: BTreeMap::new(),
            related_sections: Vec::new(),
        }
    }
}

impl Config {
    /// 加载配置：TOML 文件（可选）叠加环境变量
    ///
    /// `path` 为空时依次尝试 `EXAM_CONFIG` 环境变量和 [`DEFAULT_CONFIG_FILE`]。
    /// 显式指定但不存在的文件视为错误，默认文件不存在则直接使用默认值。
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("EXAM_CONFIG").ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_toml_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_toml_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env()?;
        Ok(config)
    }

    /// 从 TOML 文件读取配置，缺失字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(FileError::NotFound { path: path_str }.into());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| AppError::file_read_failed(&path_str, e))?;
        debug!("读取配置文件: {}", path_str);
        Self::from_toml_str(&content).map_err(|source| {
            ConfigError::TomlParseFailed {
                path: path_str,
                source,
            }
            .into()
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 用环境变量覆盖当前配置
    pub fn apply_env(&mut self) -> AppResult<()> {
        if let Some(key) = env_string("OPENAI_API_KEY").or_else(|| env_string("LLM_API_KEY")) {
            self.llm_api_key = key.trim().to_string();
        }
        if let Some(v) = env_string("LLM_API_BASE_URL") {
            self.llm_api_base_url = v;
        }
        if let Some(v) = env_string("LLM_MODEL_NAME") {
            self.llm_model_name = v;
        }
        if let Some(v) = env_string("EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Some(v) = env_string("INDEX_PATH") {
            self.index_path = v;
        }
        if let Some(v) = env_string("QUESTION_BANK_PATH") {
            self.question_bank_path = v;
        }
        if let Some(v) = env_string("PDF_FOLDER") {
            self.pdf_folder = v;
        }
        if let Some(v) = env_string("WARN_FILE") {
            self.warn_file = v;
        }
        if let Some(v) = env_parse::<bool>("VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        if let Some(v) = env_parse::<f32>("APPROVAL_THRESHOLD", "f32")? {
            self.approval_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("CANDIDATE_POOL", "usize")? {
            self.candidate_pool = v;
        }
        if let Some(v) = env_parse::<bool>("DESCRIBE_IMAGES", "bool")? {
            self.describe_images = v;
        }
        Ok(())
    }

    /// 调用 LLM / Embedding 前的前置检查
    pub fn require_api_key(&self) -> AppResult<&str> {
        let key = self.llm_api_key.trim();
        if key.is_empty() || key == "your_openai_api_key_here" {
            return Err(ConfigError::MissingApiKey {
                var_name: "OPENAI_API_KEY".to_string(),
            }
            .into());
        }
        Ok(key)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, expected_type: &str) -> AppResult<Option<T>> {
    match env_string(name) {
        Some(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }
            .into()
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            llm_model_name = "gpt-4o"
            approval_threshold = 8.5

            [mix]
            same = 2
            related = 2
            contrasting = 1

            [section_aliases]
            "Arrays (1D)" = "1D Arrays"
            "#,
        )
        .unwrap();

        assert_eq!(config.llm_model_name, "gpt-4o");
        assert_eq!(config.approval_threshold, 8.5);
        assert_eq!(config.mix.same, 2);
        assert_eq!(config.mix.related, 2);
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(
            config.section_aliases.get("Arrays (1D)").map(String::as_str),
            Some("1D Arrays")
        );
    }

    #[test]
    fn test_related_sections_from_toml() {
        let config = Config::from_toml_str(
            r#"related_sections = [["Functions", "Algorithms"]]"#,
        )
        .unwrap();
        assert_eq!(
            config.related_sections,
            vec![("Functions".to_string(), "Algorithms".to_string())]
        );
    }

    #[test]
    fn test_require_api_key() {
        let mut config = Config::default();
        assert!(config.require_api_key().is_err());

        config.llm_api_key = "your_openai_api_key_here".to_string();
        assert!(config.require_api_key().is_err());

        config.llm_api_key = "  sk-test  ".to_string();
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_toml_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exam.toml");
        std::fs::write(&path, "candidate_pool = 12\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.candidate_pool, 12);

        std::fs::write(&path, "candidate_pool = \"many\"\n").unwrap();
        let err = Config::from_toml_file(&path).unwrap_err();
        assert!(err.to_string().contains("exam.toml"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = Config::from_toml_file(Path::new("definitely/not/here.toml"));
        assert!(result.is_err());
    }
}
