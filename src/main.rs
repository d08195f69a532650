use std::error::Error;
use std::process::ExitCode;

use ragctx::{Pipeline, RagConfig, SearchScope};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ragctx <config.yaml> <query> [owner]";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RAGCTX_LOG_JSON").is_ok_and(|v| v == "1");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, query, owner) = match args.as_slice() {
        [config, query] => (config, query, None),
        [config, query, owner] => (config, query, Some(owner.clone())),
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    init_tracing();
    match run(config_path, query, owner).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &str, query: &str, owner: Option<String>) -> Result<(), Box<dyn Error>> {
    let mut cfg = RagConfig::from_file(config_path)?;
    cfg.apply_env_overrides()?;

    let pipeline = Pipeline::new(cfg)?;
    let ensured = pipeline.ensure_index().await?;
    tracing::info!(
        documents = ensured.handle.len(),
        source = ?ensured.source,
        "index_ready"
    );

    let scope = match owner {
        Some(owner) => SearchScope::owner(owner),
        None => SearchScope::general(),
    };
    let ctx = pipeline.build_context_default(query, &scope).await;
    println!("{}", serde_json::to_string_pretty(&ctx)?);
    eprintln!(
        "{} documents, confidence {:.2} ({})",
        ctx.len(),
        ctx.confidence_score,
        ctx.quality_level()
    );
    Ok(())
}
