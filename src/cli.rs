//! 命令行参数
//!
//! 只负责解析，具体执行交给 `orchestrator::App`。

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::models::{Difficulty, ExamGenerationRequest, MixPolicy};

#[derive(Parser, Debug)]
#[command(
    name = "exam-generator",
    version,
    about = "Extract exam questions from PDFs and generate new practice exams"
)]
pub struct Cli {
    /// TOML 配置文件（默认读取 EXAM_CONFIG 或 ./exam_generator.toml）
    #[arg(long, global = true, env = "EXAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// 输出 debug 级别日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 从 PDF 中提取题目、图片和公式
    Extract(ExtractArgs),

    /// 把题库 JSON 写入向量索引（会重建集合）
    Ingest(IngestArgs),

    /// 把生成的题目回写到已有索引
    AddGenerated(AddGeneratedArgs),

    /// 生成一份新试卷
    Generate(GenerateArgs),

    /// 用一次最小的对话请求检查 API Key
    CheckKey,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Extract(_) => "extract",
            Commands::Ingest(_) => "ingest",
            Commands::AddGenerated(_) => "add-generated",
            Commands::Generate(_) => "generate",
            Commands::CheckKey => "check-key",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// 只处理这一个 PDF
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// PDF 目录（默认使用配置中的 pdf_folder）
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// 输出目录（默认使用配置中的 extraction_output_dir）
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// 文本过少的页面使用 OCR
    #[arg(long)]
    pub ocr: bool,

    /// 不调用 LLM：只用正则切分题目，也不描述图片
    #[arg(long)]
    pub no_llm: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// 题库 JSON（默认使用配置中的 question_bank_path）
    #[arg(long)]
    pub bank: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AddGeneratedArgs {
    /// 生成题 JSON：题目数组或带 questions 的试卷
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// 目标总分
    #[arg(long, default_value_t = 100)]
    pub marks: u32,

    /// 难度：easy / medium / hard
    #[arg(long, default_value = "medium")]
    pub difficulty: Difficulty,

    /// 题目数量（默认按每题约 15 分估算）
    #[arg(long)]
    pub num_questions: Option<usize>,

    /// 指定章节
    #[arg(long, num_args = 1..)]
    pub sections: Vec<String>,

    /// 每道题的风格示例数
    #[arg(long, default_value_t = 5)]
    pub style_examples: usize,

    /// 每道题最多生成几次（评审不通过时重试）
    #[arg(long, default_value_t = 2)]
    pub iterations: usize,

    /// 输出文件
    #[arg(long, default_value = "output/new_exam_v1.json")]
    pub output: PathBuf,

    /// 同章节示例配额（覆盖配置）
    #[arg(long)]
    pub same: Option<usize>,

    /// 相关章节示例配额（覆盖配置）
    #[arg(long)]
    pub related: Option<usize>,

    /// 对比章节示例配额（覆盖配置）
    #[arg(long)]
    pub contrasting: Option<usize>,
}

impl GenerateArgs {
    pub fn to_request(&self, config: &Config) -> ExamGenerationRequest {
        ExamGenerationRequest {
            course: config.course.clone(),
            target_marks: self.marks,
            difficulty: self.difficulty,
            num_questions: self.num_questions,
            sections: self.sections.clone(),
            style_examples_count: self.style_examples,
            iterations: self.iterations,
        }
    }

    /// 命令行配额覆盖配置中的配额
    pub fn mix(&self, config: &Config) -> MixPolicy {
        MixPolicy {
            same: self.same.unwrap_or(config.mix.same),
            related: self.related.unwrap_or(config.mix.related),
            contrasting: self.contrasting.unwrap_or(config.mix.contrasting),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_defaults() {
        let cli = Cli::try_parse_from(["exam-generator", "generate"]).unwrap();
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let config = Config::default();
        let request = args.to_request(&config);
        assert_eq!(request.target_marks, 100);
        assert_eq!(request.difficulty, Difficulty::Medium);
        assert_eq!(request.style_examples_count, 5);
        assert_eq!(request.iterations, 2);
        assert_eq!(args.output, PathBuf::from("output/new_exam_v1.json"));
        assert_eq!(args.mix(&config), MixPolicy::default());
    }

    #[test]
    fn test_generate_flags() {
        let cli = Cli::try_parse_from([
            "exam-generator",
            "-v",
            "generate",
            "--marks",
            "60",
            "--difficulty",
            "hard",
            "--sections",
            "1D Arrays",
            "Functions",
            "--same",
            "1",
            "--contrasting",
            "0",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.difficulty, Difficulty::Hard);
        assert_eq!(args.sections, vec!["1D Arrays", "Functions"]);
        assert_eq!(args.mix(&Config::default()), MixPolicy::new(1, 1, 0));
    }

    #[test]
    fn test_bad_difficulty_rejected() {
        assert!(Cli::try_parse_from(["exam-generator", "generate", "--difficulty", "insane"]).is_err());
    }

    #[test]
    fn test_extract_and_check_key() {
        let cli = Cli::try_parse_from(["exam-generator", "extract", "--file", "a.pdf", "--ocr"]).unwrap();
        assert_eq!(cli.command.name(), "extract");
        let cli = Cli::try_parse_from(["exam-generator", "check-key"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckKey));
    }
}
