//! 文本向量化 - 基础设施层
//!
//! 直接调用 OpenAI 兼容的 `/embeddings` 接口。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{AppResult, EmbeddingError};

/// 文本 -> 向量
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;
}

#[derive(Serialize)]
struct EmbReq<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbResp {
    data: Vec<EmbData>,
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &Config) -> AppResult<Self> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self {
            client: Client::new(),
            api_key,
            endpoint: format!(
                "{}/embeddings",
                config.llm_api_base_url.trim_end_matches('/')
            ),
            model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        debug!("调用 Embedding API，模型: {}，文本长度: {}", self.model, text.len());

        let body = EmbReq {
            model: &self.model,
            input: text,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|source| EmbeddingError::RequestFailed {
                model: self.model.clone(),
                source,
            })?;

        let status = resp.status();
        let txt = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EmbeddingError::BadResponse {
                status: status.as_u16(),
                body: txt,
            }
            .into());
        }

        let parsed: EmbResp =
            serde_json::from_str(&txt).map_err(|e| EmbeddingError::BadResponse {
                status: status.as_u16(),
                body: format!("无法解析响应: {}", e),
            })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                EmbeddingError::EmptyVector {
                    model: self.model.clone(),
                }
                .into()
            })
    }
}
