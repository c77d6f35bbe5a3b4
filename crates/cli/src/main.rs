use autowriter_adapters::{
    preview_document, AdapterError, ChatCompletionClient, PlainTextWriter,
};
use autowriter_core::{
    load_inputs, ComposerLimits, Config, ConfigError, DocumentError, DocumentWriter, LogFacade,
    LogLevel, LogRecord, LogSink, NovelDocument, NovelService, PromptComposer, PromptError,
    PromptRegistry, SamplingParams, SharedLogSink, StdoutLogSink,
};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const PREVIEW_CHARS: usize = 1_000;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    load_env_file(cli.env_file.as_deref())?;

    let (min_level, filter) = if cli.verbose {
        (LogLevel::Debug, LevelFilter::Debug)
    } else {
        (LogLevel::Info, LevelFilter::Info)
    };
    let sink: SharedLogSink = Arc::new(StdoutLogSink::new().with_min_level(min_level));
    LogFacade::install(Arc::clone(&sink), filter)?;

    match cli.command {
        Command::Generate(args) => run_generate(&cli.config, args, sink.as_ref()),
        Command::Config(command) => handle_config(&cli.config, command, sink.as_ref()),
        Command::Preview(args) => run_preview(args),
    }
}

fn load_env_file(path: Option<&Path>) -> Result<(), CliError> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|source| CliError::EnvFile {
                path: path.to_path_buf(),
                source,
            })?;
        }
        None => {
            if let Err(err) = dotenvy::dotenv() {
                if !err.not_found() {
                    return Err(CliError::Dotenv(err));
                }
            }
        }
    }
    Ok(())
}

fn load_config(config_path: &Path) -> Result<Config, CliError> {
    let mut config = Config::load_or_default(config_path)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

fn handle_config(
    config_path: &Path,
    command: ConfigCommand,
    sink: &dyn LogSink,
) -> Result<(), CliError> {
    match command {
        ConfigCommand::Init(args) => run_init_config(config_path, args, sink),
        ConfigCommand::TestApi => run_test_api(config_path, sink),
    }
}

fn run_generate(
    config_path: &Path,
    args: GenerateArgs,
    sink: &dyn LogSink,
) -> Result<(), CliError> {
    let mut config = load_config(config_path)?;
    args.apply_to(&mut config);
    config.validate()?;

    let client = ChatCompletionClient::from_config(&config.api)?;
    let prompts = PromptRegistry::from_prompt_config(&config.prompts)?;

    let user_request = match args.request {
        Some(request) => resolve_request(&request, &config.novel.default_request),
        None => prompt_for_request(&config.novel.default_request)?,
    };

    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("生成要求：{user_request}"),
    ));
    sink.log(LogRecord::new(
        LogLevel::Debug,
        format!(
            "模型: {} | 接口: {} | 章节数: {} | 最大尝试次数: {}",
            client.model_name(),
            client.endpoint(),
            config.novel.total_chapters,
            config.api.max_attempts
        ),
    ));

    let input = match load_inputs(&config.novel.system_prompt_path, &config.novel.reference_path)
    {
        Ok(input) => input,
        Err(err) => {
            sink.log(LogRecord::new(
                LogLevel::Error,
                format!("❌ 读取输入文件失败：{err}"),
            ));
            return Ok(());
        }
    };

    let composer = PromptComposer::new(&prompts)
        .with_sampling(SamplingParams {
            temperature: config.api.temperature,
            top_p: config.api.top_p,
        })
        .with_limits(ComposerLimits::from(&config.novel));
    let service = NovelService::new(composer, sink)
        .with_max_attempts(config.api.max_attempts)
        .with_fallback_title(config.novel.fallback_title.clone());

    let draft = match service.run(&client, &input, &user_request, config.novel.total_chapters) {
        Ok(draft) => draft,
        Err(err) => {
            sink.log(LogRecord::new(
                LogLevel::Error,
                format!("❌ 小说生成失败：{err}"),
            ));
            return Ok(());
        }
    };

    let document = NovelDocument::from(&draft);
    let writer = PlainTextWriter::new(&config.novel.output_dir);
    let path = match writer.write(&document) {
        Ok(path) => path,
        Err(err) => {
            sink.log(LogRecord::new(
                LogLevel::Error,
                format!("❌ 保存小说失败：{err}"),
            ));
            return Ok(());
        }
    };

    sink.log(LogRecord::new(LogLevel::Info, "✅ 小说生成完成！"));
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("标题：{}", draft.title()),
    ));
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("文件：{}", path.display()),
    ));
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("正文字数：{}", document.body.chars().count()),
    ));
    let failed = draft.failed_chapters();
    if !failed.is_empty() {
        sink.log(LogRecord::new(
            LogLevel::Warn,
            format!("以下章节生成失败并已跳过：{failed:?}"),
        ));
    }

    Ok(())
}

fn run_init_config(config_path: &Path, args: InitArgs, sink: &dyn LogSink) -> Result<(), CliError> {
    write_default_config(config_path, args.force)?;
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("已写入默认配置：{}", config_path.display()),
    ));
    sink.log(LogRecord::new(
        LogLevel::Info,
        "API Key 请通过环境变量 DEEPSEEK_API_KEY 或 .env 文件提供。",
    ));
    Ok(())
}

fn write_default_config(config_path: &Path, force: bool) -> Result<(), CliError> {
    if config_path.exists() && !force {
        return Err(CliError::ConfigExists(config_path.to_path_buf()));
    }
    Config::default().to_path(config_path)?;
    Ok(())
}

fn run_test_api(config_path: &Path, sink: &dyn LogSink) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    config.validate()?;
    let client = ChatCompletionClient::from_config(&config.api)?;

    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("开始测试 API 配置：{}", client.endpoint()),
    ));
    sink.log(LogRecord::new(
        LogLevel::Debug,
        format!("模型: {}", client.model_name()),
    ));

    match client.probe() {
        Ok(response) => {
            sink.log(LogRecord::new(LogLevel::Info, "✅ API连接测试成功！"));
            sink.log(LogRecord::new(
                LogLevel::Info,
                format!("测试回复: {}", response.content.trim()),
            ));
            Ok(())
        }
        Err(err) => {
            let diagnostic = err.diagnostic(200);
            sink.log(LogRecord::new(
                LogLevel::Error,
                format!("❌ API连接测试失败：{diagnostic}"),
            ));
            Err(CliError::TestFailed(format!("API连接测试失败：{diagnostic}")))
        }
    }
}

fn run_preview(args: PreviewArgs) -> Result<(), CliError> {
    let preview = preview_document(&args.file, PREVIEW_CHARS)?;
    let rule = "=".repeat(50);
    println!("=== 文档预览：{} ===", args.file.display());
    println!("总段落数：{}", preview.paragraphs);
    println!("总字符数：{}", preview.char_count);
    println!("{rule}");
    println!("前{PREVIEW_CHARS}字预览：");
    println!("{rule}");
    println!("{}", preview.excerpt);
    println!("{rule}");
    Ok(())
}

fn prompt_for_request(default_request: &str) -> Result<String, CliError> {
    println!("默认生成要求：{default_request}");
    print!("请输入生成要求（直接回车使用默认要求）：");
    io::stdout().flush().map_err(CliError::Stdin)?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(CliError::Stdin)?;
    Ok(resolve_request(&line, default_request))
}

fn resolve_request(input: &str, default_request: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        default_request.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("配置文件错误: {0}")]
    Config(#[from] ConfigError),
    #[error("配置文件已存在：{0}（使用 --force 覆盖）")]
    ConfigExists(PathBuf),
    #[error("读取环境变量文件 `{path}` 失败: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("读取 .env 文件失败: {0}")]
    Dotenv(dotenvy::Error),
    #[error("日志初始化失败: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error("读取终端输入失败: {0}")]
    Stdin(io::Error),
    #[error("适配器初始化失败: {0}")]
    Adapter(#[from] AdapterError),
    #[error("提示词加载失败: {0}")]
    Prompt(#[from] PromptError),
    #[error("文档读取失败: {0}")]
    Document(#[from] DocumentError),
    #[error("{0}")]
    TestFailed(String),
}

#[derive(Parser)]
#[command(name = "autowriter", version, about = "AI 短篇小说生成命令行工具")]
struct Cli {
    /// 指定配置文件路径
    #[arg(long, global = true, default_value = "autowriter.json")]
    config: PathBuf,

    /// 指定 .env 文件路径，默认读取当前目录下的 .env
    #[arg(long, global = true, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// 输出调试日志
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 生成大纲、标题与全部章节，并保存为文本文件
    Generate(GenerateArgs),
    /// 配置相关操作
    #[command(subcommand)]
    Config(ConfigCommand),
    /// 预览已生成的小说文件
    Preview(PreviewArgs),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// 写出默认配置文件
    Init(InitArgs),
    /// 发送一条简短提示词，测试 API 配置
    TestApi,
}

#[derive(Args)]
struct InitArgs {
    /// 覆盖已存在的配置文件
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct PreviewArgs {
    /// 待预览的文件路径
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Args)]
struct GenerateArgs {
    /// 生成要求，省略时在终端中询问
    #[arg(long, value_name = "TEXT")]
    request: Option<String>,
    /// 系统提示词文件，默认使用配置中的 prompt.txt
    #[arg(long, value_name = "FILE")]
    prompt_file: Option<PathBuf>,
    /// 参考范文文件，默认使用配置中的 example.txt
    #[arg(long, value_name = "FILE")]
    example_file: Option<PathBuf>,
    /// 章节数量
    #[arg(long, value_name = "N")]
    chapters: Option<u32>,
    /// 输出目录
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// 单次请求的最大尝试次数
    #[arg(long, value_name = "N")]
    max_attempts: Option<usize>,
}

impl GenerateArgs {
    fn apply_to(&self, config: &mut Config) {
        if let Some(path) = &self.prompt_file {
            config.novel.system_prompt_path = path.clone();
        }
        if let Some(path) = &self.example_file {
            config.novel.reference_path = path.clone();
        }
        if let Some(chapters) = self.chapters {
            config.novel.total_chapters = chapters;
        }
        if let Some(dir) = &self.output_dir {
            config.novel.output_dir = dir.clone();
        }
        if let Some(attempts) = self.max_attempts {
            config.api.max_attempts = attempts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generate_flags_override_config() {
        let cli = Cli::try_parse_from([
            "autowriter",
            "--verbose",
            "generate",
            "--request",
            "写一个科幻故事",
            "--chapters",
            "5",
            "--prompt-file",
            "sys.txt",
            "--max-attempts",
            "2",
        ])
        .unwrap();
        assert!(cli.verbose);

        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let mut config = Config::default();
        args.apply_to(&mut config);

        assert_eq!(args.request.as_deref(), Some("写一个科幻故事"));
        assert_eq!(config.novel.total_chapters, 5);
        assert_eq!(config.novel.system_prompt_path, PathBuf::from("sys.txt"));
        assert_eq!(config.novel.reference_path, PathBuf::from("example.txt"));
        assert_eq!(config.api.max_attempts, 2);
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["autowriter", "config", "test-api"]).unwrap();
        assert!(matches!(cli.command, Command::Config(ConfigCommand::TestApi)));
        assert_eq!(cli.config, PathBuf::from("autowriter.json"));

        let cli =
            Cli::try_parse_from(["autowriter", "config", "init", "--force", "--config", "a.json"])
                .unwrap();
        assert_eq!(cli.config, PathBuf::from("a.json"));
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Init(InitArgs { force: true }))
        ));
    }

    #[test]
    fn preview_takes_a_positional_file() {
        let cli =
            Cli::try_parse_from(["autowriter", "preview", "雨夜_20240309_070501.txt"]).unwrap();
        let Command::Preview(args) = cli.command else {
            panic!("expected preview");
        };
        assert_eq!(args.file, PathBuf::from("雨夜_20240309_070501.txt"));
    }

    #[test]
    fn blank_request_falls_back_to_default() {
        assert_eq!(resolve_request("  \n", "默认"), "默认");
        assert_eq!(resolve_request(" 悬疑 \n", "默认"), "悬疑");
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("autowriter.json");

        write_default_config(&path, false).unwrap();
        assert!(matches!(
            write_default_config(&path, false),
            Err(CliError::ConfigExists(_))
        ));
        write_default_config(&path, true).unwrap();
        assert_eq!(Config::from_path(&path).unwrap(), Config::default());
    }
}
