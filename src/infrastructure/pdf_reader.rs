//! PDF 读取 - 基础设施层
//!
//! - 文本层：`pdf-extract`（库内部可能 panic，用 `catch_unwind` 兜住）
//! - 图片：`lopdf` 遍历每页的图片 XObject
//! - OCR：外部命令 `pdftoppm` 渲染单页 + `tesseract` 识别

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, FileError, PdfError};

/// 页面文本来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    TextLayer,
    Ocr,
}

/// 单页文本（页码从 1 开始）
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
    pub source: TextSource,
}

/// 页面中嵌入的一张图片
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
    pub page: u32,
    /// 页内序号（从 1 开始）
    pub index: usize,
    pub width: i64,
    pub height: i64,
    pub filter: Option<String>,
    pub data: Vec<u8>,
}

impl EmbeddedImage {
    /// DCTDecode 流本身就是完整的 JPEG 文件
    pub fn is_jpeg(&self) -> bool {
        self.filter.as_deref() == Some("DCTDecode")
    }

    /// 只有 JPEG 能直接转成视觉模型可用的 data URL
    pub fn data_url(&self) -> Option<String> {
        self.is_jpeg()
            .then(|| format!("data:image/jpeg;base64,{}", BASE64.encode(&self.data)))
    }
}

/// PDF 读取器
pub struct PdfReader {
    ocr_enabled: bool,
    ocr_min_chars: usize,
    ocr_language: String,
}

impl PdfReader {
    pub fn new(config: &Config, ocr_enabled: bool) -> Self {
        Self {
            ocr_enabled,
            ocr_min_chars: config.ocr_min_chars,
            ocr_language: config.ocr_language.clone(),
        }
    }

    /// 读取全部页面文本
    ///
    /// 开启 OCR 时，字符数不足的页面改用 OCR；文本层整体失败时尝试对全部页面 OCR。
    pub async fn read_pages(&self, path: &Path) -> AppResult<Vec<PageText>> {
        ensure_exists(path)?;

        let owned = path.to_path_buf();
        let text_layer = tokio::task::spawn_blocking(move || extract_text_layer(&owned))
            .await
            .map_err(|e| PdfError::TextExtractionFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let mut pages: Vec<PageText> = match text_layer {
            Ok(texts) => texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| PageText {
                    page: i as u32 + 1,
                    text,
                    source: TextSource::TextLayer,
                })
                .collect(),
            Err(e) => {
                warn!("⚠️ 文本层提取失败，尝试整份 OCR: {}", e);
                return self.ocr_all_pages(path).await.map_err(|ocr_err| {
                    debug!("整份 OCR 失败: {}", ocr_err);
                    e
                });
            }
        };

        if !self.ocr_enabled {
            return Ok(pages);
        }

        let candidates: Vec<usize> = pages
            .iter()
            .enumerate()
            .filter(|(_, p)| non_whitespace_chars(&p.text) < self.ocr_min_chars)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return Ok(pages);
        }

        if !ocr_tools_available().await {
            warn!(
                "⚠️ 有 {} 页文本过少需要 OCR，但 pdftoppm/tesseract 不可用，保留文本层结果",
                candidates.len()
            );
            return Ok(pages);
        }

        for i in candidates {
            let page_no = pages[i].page;
            match ocr_page(path, page_no, &self.ocr_language).await {
                Ok(text) if non_whitespace_chars(&text) > 0 => {
                    debug!("第 {} 页使用 OCR 结果 ({} 字符)", page_no, text.len());
                    pages[i].text = text;
                    pages[i].source = TextSource::Ocr;
                }
                Ok(_) => debug!("第 {} 页 OCR 结果为空，保留文本层", page_no),
                Err(e) => warn!("⚠️ 第 {} 页 OCR 失败: {}", page_no, e),
            }
        }

        Ok(pages)
    }

    async fn ocr_all_pages(&self, path: &Path) -> AppResult<Vec<PageText>> {
        if !ocr_tools_available().await {
            return Err(PdfError::OcrUnavailable {
                tool: "pdftoppm/tesseract".to_string(),
            }
            .into());
        }

        let total = page_count(path)?;
        info!("🔍 对 {} 页执行 OCR...", total);
        let mut pages = Vec::with_capacity(total as usize);
        for page in 1..=total {
            let text = ocr_page(path, page, &self.ocr_language).await?;
            pages.push(PageText {
                page,
                text,
                source: TextSource::Ocr,
            });
        }
        Ok(pages)
    }

    /// 读取全部页面中的图片
    pub fn read_images(&self, path: &Path) -> AppResult<Vec<EmbeddedImage>> {
        ensure_exists(path)?;
        let doc = load_document(path)?;

        let mut images = Vec::new();
        for (page_no, page_id) in doc.get_pages() {
            let page_images = match doc.get_page_images(page_id) {
                Ok(list) => list,
                Err(e) => {
                    debug!("第 {} 页图片读取失败: {}", page_no, e);
                    continue;
                }
            };
            for (i, img) in page_images.into_iter().enumerate() {
                images.push(EmbeddedImage {
                    page: page_no,
                    index: i + 1,
                    width: img.width,
                    height: img.height,
                    filter: img.filters.as_ref().and_then(|f| f.first().cloned()),
                    data: img.content.to_vec(),
                });
            }
        }

        debug!("{} 中找到 {} 张图片", path.display(), images.len());
        Ok(images)
    }
}

fn ensure_exists(path: &Path) -> AppResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(FileError::NotFound {
            path: path.display().to_string(),
        }
        .into())
    }
}

fn load_document(path: &Path) -> AppResult<lopdf::Document> {
    lopdf::Document::load(path).map_err(|e| {
        PdfError::LoadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn page_count(path: &Path) -> AppResult<u32> {
    Ok(load_document(path)?.get_pages().len() as u32)
}

/// `pdf-extract` 按页提取文本，库内 panic 转为错误
fn extract_text_layer(path: &Path) -> AppResult<Vec<String>> {
    let path_str = path.display().to_string();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(path)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(PdfError::TextExtractionFailed {
            path: path_str,
            message: e.to_string(),
        }
        .into()),
        Err(panic_payload) => {
            let message = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            Err(PdfError::TextExtractionFailed {
                path: path_str,
                message,
            }
            .into())
        }
    }
}

/// 非空白字符数
pub fn non_whitespace_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// 能否启动外部命令（只看可执行文件是否存在）
pub async fn command_available(tool: &str) -> bool {
    Command::new(tool).arg("-v").output().await.is_ok()
}

pub async fn ocr_tools_available() -> bool {
    command_available("pdftoppm").await && command_available("tesseract").await
}

/// 渲染单页并 OCR
async fn ocr_page(path: &Path, page: u32, language: &str) -> AppResult<String> {
    let work_dir = scratch_dir(page);
    tokio::fs::create_dir_all(&work_dir)
        .await
        .map_err(|e| AppError::file_write_failed(work_dir.display().to_string(), e))?;

    let result = render_and_recognize(path, page, language, &work_dir).await;
    let _ = tokio::fs::remove_dir_all(&work_dir).await;
    result
}

async fn render_and_recognize(
    path: &Path,
    page: u32,
    language: &str,
    work_dir: &Path,
) -> AppResult<String> {
    let prefix = work_dir.join("page");
    let page_arg = page.to_string();

    let rendered = Command::new("pdftoppm")
        .args(["-f", &page_arg, "-l", &page_arg, "-r", "300", "-png", "-singlefile"])
        .arg(path)
        .arg(&prefix)
        .output()
        .await
        .map_err(|_| PdfError::OcrUnavailable {
            tool: "pdftoppm".to_string(),
        })?;
    if !rendered.status.success() {
        return Err(PdfError::OcrFailed {
            page,
            message: String::from_utf8_lossy(&rendered.stderr).trim().to_string(),
        }
        .into());
    }

    let image = prefix.with_extension("png");
    let recognized = Command::new("tesseract")
        .arg(&image)
        .arg("stdout")
        .args(["-l", language])
        .output()
        .await
        .map_err(|_| PdfError::OcrUnavailable {
            tool: "tesseract".to_string(),
        })?;
    if !recognized.status.success() {
        return Err(PdfError::OcrFailed {
            page,
            message: String::from_utf8_lossy(&recognized.stderr).trim().to_string(),
        }
        .into());
    }

    Ok(String::from_utf8_lossy(&recognized.stdout).trim().to_string())
}

fn scratch_dir(page: u32) -> PathBuf {
    let stamp = chrono::Local::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!(
        "exam_ocr_{}_{}_{}",
        std::process::id(),
        page,
        stamp
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_whitespace_chars() {
        assert_eq!(non_whitespace_chars("  a b\n\tc "), 3);
        assert_eq!(non_whitespace_chars("\n\n"), 0);
    }

    #[test]
    fn test_only_jpeg_gets_data_url() {
        let mut image = EmbeddedImage {
            page: 1,
            index: 1,
            width: 10,
            height: 10,
            filter: Some("DCTDecode".to_string()),
            data: vec![0xFF, 0xD8, 0xFF],
        };
        assert_eq!(
            image.data_url().as_deref(),
            Some("data:image/jpeg;base64,/9j/")
        );

        image.filter = Some("FlateDecode".to_string());
        assert!(image.data_url().is_none());
    }

    #[tokio::test]
    async fn test_missing_pdf_is_not_found() {
        let reader = PdfReader::new(&Config::default(), false);
        let err = reader
            .read_pages(Path::new("no/such/exam.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::File(FileError::NotFound { .. })));
        assert!(reader.read_images(Path::new("no/such/exam.pdf")).is_err());
    }

    #[test]
    fn test_garbage_file_fails_to_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"not a pdf").unwrap();
        assert!(extract_text_layer(file.path()).is_err());
        assert!(page_count(file.path()).is_err());
    }
}
