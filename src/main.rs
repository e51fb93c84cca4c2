//! speckit-translate 命令行入口

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use speckit_translator::env::{generate_env_docs, verbosity_level, EnvConfig, EnvVar, LogLevel};
use speckit_translator::markdown::{extract_section, section_anchors};
use speckit_translator::translation::{
    create_translation_source, ConfigManager, MemoryStore, MockSource, RemoteSource,
    StreamingOrchestrator, TranslationCache, TranslationConfig, TranslationError,
    TranslationRequest, TranslationResult, TranslationSource,
};

const ANSI_COLOR_RED: &str = "\x1b[31m";
const ANSI_COLOR_RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "speckit-translate", version)]
#[command(about = "Stream Chinese translations of Markdown spec documents, with a persistent cache")]
struct Cli {
    /// Configuration file (defaults to the standard search paths)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate a document or one of its sections
    Translate {
        file: PathBuf,

        /// 1-based line of the heading whose section should be translated
        #[arg(long, value_name = "LINE")]
        section: Option<usize>,

        /// Ignore any cached translation
        #[arg(long)]
        force: bool,

        /// Model to request (defaults to the configured model)
        #[arg(long)]
        model: Option<String>,

        /// Use the offline mock source
        #[arg(long)]
        offline: bool,

        /// Keep the cache in memory only
        #[arg(long)]
        no_persist: bool,

        /// Also write the final translation to this file
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// List translatable anchors of a document
    Sections { file: PathBuf },

    /// Inspect or clear the translation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show the effective settings (the API key is masked)
    CheckSettings,

    /// Send a short request to the configured translation service
    TestConnection,

    /// Write an example configuration file
    InitConfig { path: PathBuf },
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env = match EnvConfig::from_env() {
        Ok(env) => env,
        Err(e) => {
            print_error_message(&e.to_string(), color_enabled(false));
            process::exit(1);
        }
    };

    init_tracing(cli.verbose, &env);

    if let Err(e) = run(cli, &env).await {
        print_error_message(
            &format!("[{}] {}", e.code(), e),
            color_enabled(env.no_color),
        );
        process::exit(1);
    }
}

async fn run(cli: Cli, env: &EnvConfig) -> TranslationResult<()> {
    match cli.command {
        Command::Translate {
            file,
            section,
            force,
            model,
            offline,
            no_persist,
            output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let text = read_source_text(&file, section)?;

            let source: Arc<dyn TranslationSource> = if offline || env.offline {
                tracing::info!("离线模式，使用模拟翻译源");
                Arc::new(MockSource::with_delay(env.mock_chunk_delay))
            } else {
                create_translation_source(&config, false)?
            };
            let cache = open_cache(&config, no_persist)?;

            let request = TranslationRequest {
                text,
                model,
                force_bypass_cache: force,
            };
            translate(source, cache, &request, output.as_deref()).await
        }
        Command::Sections { file } => {
            let content = read_file(&file)?;
            for anchor in section_anchors(&content) {
                if anchor.is_document() {
                    println!("{:>5}  [全文] {}", anchor.line + 1, anchor.title);
                } else {
                    println!(
                        "{:>5}  {} {}",
                        anchor.line + 1,
                        "#".repeat(anchor.level),
                        anchor.title
                    );
                }
            }
            Ok(())
        }
        Command::Cache { action } => {
            let config = load_config(cli.config.as_deref())?;
            let path = config.resolved_cache_path();
            let cache = TranslationCache::open(&path)?;

            match action {
                CacheAction::Stats => {
                    let stats = cache.get_stats();
                    println!("缓存文件: {}", path.display());
                    println!("条目数: {}", stats.entry_count);
                    println!("总字符数: {}", stats.total_size);
                }
                CacheAction::Clear => {
                    cache.clear();
                    println!("翻译缓存已清空 ({} 个条目保留)", cache.get_stats().entry_count);
                }
            }
            Ok(())
        }
        Command::CheckSettings => {
            let manager = match cli.config.as_deref() {
                Some(path) => ConfigManager::from_path(path)?,
                None => ConfigManager::new()?,
            };

            println!("SpecKit 翻译设置:");
            for (label, value) in manager.get_config().settings_summary() {
                println!("  {}: {}", label, value);
            }
            match manager.source_path() {
                Some(path) => println!("  配置文件: {}", path.display()),
                None => println!("  配置文件: 未找到，使用默认值"),
            }
            println!();
            print!("{}", generate_env_docs());
            Ok(())
        }
        Command::TestConnection => {
            let config = load_config(cli.config.as_deref())?;
            let source = RemoteSource::new(config)?;
            if !source.is_available() {
                return Err(TranslationError::ConfigError(
                    "未配置 API 密钥，无法测试连接".to_string(),
                ));
            }

            println!("正在连接 {} ...", source.endpoint());
            if source.test_connection().await? {
                println!("连接成功");
                Ok(())
            } else {
                Err(TranslationError::EmptyTranslation)
            }
        }
        Command::InitConfig { path } => {
            if path.exists() {
                return Err(TranslationError::InvalidInput(format!(
                    "文件已存在: {}",
                    path.display()
                )));
            }
            ConfigManager::generate_example_config(&path)?;
            println!("示例配置已写入 {}", path.display());
            Ok(())
        }
    }
}

/// 流式输出译文：每次只打印快照中新增的部分
async fn translate(
    source: Arc<dyn TranslationSource>,
    cache: TranslationCache,
    request: &TranslationRequest,
    output: Option<&Path>,
) -> TranslationResult<()> {
    let orchestrator = StreamingOrchestrator::new(source, Arc::new(cache));

    let mut stdout = std::io::stdout();
    let mut printed = 0;
    let outcome = orchestrator
        .translate(request, |update| {
            if let Some(suffix) = update.text.get(printed..) {
                let _ = write!(stdout, "{}", suffix);
                let _ = stdout.flush();
            }
            printed = update.text.len();
        })
        .await?;
    println!();

    if outcome.from_cache() {
        tracing::info!("使用缓存的译文");
    }

    if let Some(path) = output {
        std::fs::write(path, outcome.text()).map_err(|e| {
            TranslationError::IoError(format!("无法写入 {}: {}", path.display(), e))
        })?;
        tracing::info!("译文已写入 {}", path.display());
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> TranslationResult<TranslationConfig> {
    let manager = match path {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };
    Ok(manager.into_config())
}

fn open_cache(config: &TranslationConfig, no_persist: bool) -> TranslationResult<TranslationCache> {
    if no_persist {
        return Ok(TranslationCache::new(Arc::new(MemoryStore::new())));
    }
    TranslationCache::open(config.resolved_cache_path())
}

fn read_file(path: &Path) -> TranslationResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| TranslationError::IoError(format!("无法读取 {}: {}", path.display(), e)))
}

fn read_source_text(path: &Path, section: Option<usize>) -> TranslationResult<String> {
    let content = read_file(path)?;

    let Some(line) = section else {
        return Ok(content);
    };

    line.checked_sub(1)
        .and_then(|index| extract_section(&content, index))
        .ok_or_else(|| {
            TranslationError::InvalidInput(format!("第 {} 行不是 Markdown 标题", line))
        })
}

fn init_tracing(verbose: u8, env: &EnvConfig) {
    let level = verbosity_level(verbose, env.log_level);

    let filter = EnvFilter::try_new(format!(
        "speckit_translator={level},speckit_translate={level}"
    ))
    .unwrap_or_else(|_| EnvFilter::new(LogLevel::DEFAULT.unwrap_or("info")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(color_enabled(env.no_color))
        .try_init();
}

fn color_enabled(no_color: bool) -> bool {
    !no_color && atty::is(atty::Stream::Stderr)
}

fn print_error_message(msg: &str, color: bool) {
    if color {
        eprintln!("{ANSI_COLOR_RED}{msg}{ANSI_COLOR_RESET}");
    } else {
        eprintln!("{msg}");
    }
}
