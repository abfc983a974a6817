use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 向量化服务错误
    #[error("Embedding错误: {0}")]
    Embedding(#[from] EmbeddingError),
    /// 向量索引错误
    #[error("索引错误: {0}")]
    Index(#[from] IndexError),
    /// PDF 读取错误
    #[error("PDF错误: {0}")]
    Pdf(#[from] PdfError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 缺少 API Key
    #[error("未找到 API Key，请设置环境变量 {var_name} 或在配置文件中填写 llm_api_key")]
    MissingApiKey { var_name: String },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 请求构建失败
    #[error("LLM 请求构建失败: {message}")]
    RequestBuildFailed { message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 向量化服务错误
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// 网络请求失败
    #[error("Embedding 请求失败 (模型: {model}): {source}")]
    RequestFailed {
        model: String,
        #[source]
        source: reqwest::Error,
    },
    /// API 返回错误响应
    #[error("Embedding API 返回错误 (状态码: {status}): {body}")]
    BadResponse { status: u16, body: String },
    /// 返回向量为空
    #[error("Embedding API 返回空向量 (模型: {model})")]
    EmptyVector { model: String },
}

/// 向量索引错误
#[derive(Debug, Error)]
pub enum IndexError {
    /// 集合不存在
    #[error("集合 '{collection}' 不存在 ({path})，请先运行 ingest")]
    CollectionNotFound { collection: String, path: String },
    /// 向量维度不一致
    #[error("向量维度不一致: 期望 {expected}, 实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// PDF 读取错误
#[derive(Debug, Error)]
pub enum PdfError {
    /// 文本提取失败
    #[error("PDF文本提取失败 ({path}): {message}")]
    TextExtractionFailed { path: String, message: String },
    /// 文档解析失败
    #[error("PDF文档解析失败 ({path}): {message}")]
    LoadFailed { path: String, message: String },
    /// OCR 工具不可用
    #[error("OCR 工具不可用: {tool}")]
    OcrUnavailable { tool: String },
    /// OCR 执行失败
    #[error("OCR 执行失败 (第 {page} 页): {message}")]
    OcrFailed { page: u32, message: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建 JSON 解析错误
    pub fn json_parse_failed(path: impl Into<String>, source: serde_json::Error) -> Self {
        AppError::File(FileError::JsonParseFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(model: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            message: message.to_string(),
        })
    }

    /// 是否为缺少凭证的错误（唯一不可降级的外部服务错误）
    pub fn is_missing_credentials(&self) -> bool {
        matches!(self, AppError::Config(ConfigError::MissingApiKey { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
