//! 警告文件 - 业务能力层
//!
//! warn.txt 是给人看的待办清单：每行一条需要人工复查的记录。

use anyhow::{Context, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// 警告文件写入器
///
/// 职责：
/// - 记录被跳过的 PDF、生成失败的题位、超出重试次数后被强制接受的题目
/// - 一条记录一行，换行会被压平
/// - 只追加，不关心调用顺序
pub struct WarnWriter {
    path: String,
}

impl WarnWriter {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 追加一行 `[时间] scope | reason | detail`
    ///
    /// - `scope`: 出问题的对象（文件名、题位上下文）
    /// - `reason`: 原因
    /// - `detail`: 错误信息或题干预览
    pub async fn write(&self, scope: &str, reason: &str, detail: &str) -> Result<()> {
        debug!("写入警告: {} | {}", scope, reason);

        let line = format!(
            "[{}] {} | {} | {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            scope,
            reason,
            detail.replace(['\r', '\n'], " ")
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("无法打开警告文件: {}", self.path))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("无法写入警告文件: {}", self.path))?;
        file.flush().await?;

        Ok(())
    }
}
