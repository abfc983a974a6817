/// 日志工具模块
///
/// 提供日志初始化、横幅与统计输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；未设置时默认 info，`verbose` 时为 debug。
/// 重复调用（例如测试中）直接忽略。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("exam_generator={},warn", default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `command`: 子命令名称
pub fn log_startup(command: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {}", command);
    info!(
        "启动时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

/// 记录题位开始信息
pub fn log_slot_start(slot: usize, total: usize, section: &str, marks: u32) {
    info!("\n{}", "─".repeat(60));
    info!("📝 第 {}/{} 题: {} ({} 分)", slot, total, section, marks);
    info!("{}", "─".repeat(60));
}

/// 打印子命令的最终统计
///
/// `unit` 为统计对象（"PDF"、"题目"、"题位"）。
pub fn print_final_stats(unit: &str, success: usize, failed: usize, total: usize, output_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!(
        "📊 完成统计 ({})",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功 {}: {}/{}", unit, success, total);
    if failed > 0 {
        info!("❌ 跳过 {}: {}", unit, failed);
    }
    info!("📁 输出: {}", output_path);
    info!("{}", "=".repeat(60));
}

/// 按字符截断，用于日志和提示词中的预览
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("二维数组与函数", 4), "二维数组...");
    }
}
