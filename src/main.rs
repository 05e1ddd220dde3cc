//! Haven 命令行入口
//!
//! ```text
//! haven probe                       打印能力报告
//! haven status                      预热所有模型并打印槽位状态
//! haven generate <kind> <text...>   生成一段文本（kind: reflection / journal-prompt / ...）
//! haven classify <text...>          只做危机判定
//! ```
//!
//! 配置文件路径可通过 HAVEN_CONFIG 指定。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use haven::{
    core::{create_runtime_builder, RECORD_FILE},
    engine::MockEngine,
    observability,
    probe::NativeHost,
    progress::ProgressStatus,
    storage::FileStore,
    GenerationContext, GenerationKind,
};

const USAGE: &str = "usage: haven <probe | status | generate <kind> <text...> | classify <text...>>";

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let builder = create_runtime_builder(std::env::var_os("HAVEN_CONFIG").map(PathBuf::from));
    let data_dir = builder.config().data_dir();
    let runtime = builder
        .with_host(Arc::new(NativeHost::new()))
        .with_engine(Arc::new(MockEngine::new()))
        .with_store(Arc::new(FileStore::new(data_dir.join(RECORD_FILE))))
        .build()
        .context("Failed to build runtime")?;

    // 进度帧只写日志，stdout 留给 JSON 输出
    let progress = runtime.bus.subscribe(|state| match state.status {
        ProgressStatus::Idle => {}
        ProgressStatus::Error => tracing::warn!(
            progress = state.progress,
            label = %state.label,
            details = ?state.details,
            "progress"
        ),
        _ => tracing::info!(
            progress = state.progress,
            label = %state.label,
            details = ?state.details,
            "progress"
        ),
    });

    match command.as_str() {
        "probe" => print_json(&runtime.report())?,
        "status" => {
            for (role, ready) in runtime.lifecycle.preload().await {
                tracing::info!(role = %role, ready, "Preload finished");
            }
            print_json(&runtime.lifecycle.statuses())?;
        }
        "generate" => {
            let kind: GenerationKind = args
                .get(1)
                .context(USAGE)?
                .parse()
                .map_err(anyhow::Error::msg)?;
            let text = args[2..].join(" ");
            let outcome = runtime.generate(kind, &text, &GenerationContext::default()).await;
            print_json(&outcome)?;
        }
        "classify" => {
            let text = args[1..].join(" ");
            if text.trim().is_empty() {
                bail!(USAGE);
            }
            print_json(&runtime.classify(&text))?;
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }

    progress.unsubscribe();
    Ok(())
}
