use tracing::{info, warn};

use clause_scout::pipeline::ClausePipeline;
use clause_scout::{
    is_manual_placeholder, probe, Config, DeploymentContext, ExtractionRequest, ExtractionResult,
};

struct CliArgs {
    screeners: Vec<String>,
    context: DeploymentContext,
    base_url: Option<String>,
    probe_only: bool,
    json: bool,
}

fn parse_args() -> CliArgs {
    let mut screeners = Vec::new();
    let mut context = DeploymentContext::Development;
    let mut base_url = None;
    let mut probe_only = false;
    let mut json = false;

    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "--production" | "--prod" => context = DeploymentContext::Production,
            "--probe" => probe_only = true,
            "--json" => json = true,
            "--base-url" => {
                if let Some(v) = args.next() {
                    base_url = Some(v);
                }
            }
            other => {
                if let Some(rest) = other.strip_prefix("--base-url=") {
                    base_url = Some(rest.to_string());
                } else if let Some(rest) = other.strip_prefix("--context=") {
                    context = DeploymentContext::from_option(Some(rest));
                } else if other.starts_with("--") {
                    warn!("ignoring unknown flag: {other}");
                } else {
                    screeners.push(other.to_string());
                }
            }
        }
    }

    CliArgs {
        screeners,
        context,
        base_url,
        probe_only,
        json,
    }
}

fn print_usage() {
    eprintln!(
        "Usage: clause-scout [--production] [--json] [--base-url URL] NAME...\n\
         \x20      clause-scout --probe\n\
         \n\
         Resolves the scan clause for each named screener. Placeholder\n\
         results start with '#' and need manual entry later."
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = parse_args();

    let mut config = Config::from_env();
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }

    if cli.probe_only {
        let snapshot = probe::probe(&config);
        println!("{}", probe::render_report(&config, &snapshot));
        if !snapshot.browser_stack_available() {
            std::process::exit(2);
        }
        return Ok(());
    }

    if cli.screeners.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    let pipeline = ClausePipeline::new(config)?;
    let mut failures = 0usize;
    let mut placeholders = 0usize;

    for screener in &cli.screeners {
        let request = ExtractionRequest::new(screener.clone(), cli.context);
        let result = pipeline.resolve(&request).await;

        if cli.json {
            println!("{}", render_json(screener, &result));
        } else {
            render_plain(screener, &result);
        }

        match &result {
            ExtractionResult::ManualPlaceholder(_) => placeholders += 1,
            ExtractionResult::Failed(_) => failures += 1,
            ExtractionResult::Resolved(_) => {}
        }
    }

    info!(
        resolved = cli.screeners.len() - failures - placeholders,
        placeholders,
        failures,
        "done"
    );
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn render_plain(screener: &str, result: &ExtractionResult) {
    match result {
        ExtractionResult::Resolved(clause) => println!("{screener}: {clause}"),
        ExtractionResult::ManualPlaceholder(value) => {
            debug_assert!(is_manual_placeholder(value));
            println!("{screener}: {value}");
        }
        ExtractionResult::Failed(e) => eprintln!("{screener}: FAILED: {e}"),
    }
}

fn render_json(screener: &str, result: &ExtractionResult) -> String {
    let value = match result {
        ExtractionResult::Resolved(clause) => serde_json::json!({
            "screener": screener,
            "status": "resolved",
            "scan_clause": clause,
        }),
        ExtractionResult::ManualPlaceholder(placeholder) => serde_json::json!({
            "screener": screener,
            "status": "manual_placeholder",
            "scan_clause": placeholder,
        }),
        ExtractionResult::Failed(e) => serde_json::json!({
            "screener": screener,
            "status": "failed",
            "error": e.to_string(),
        }),
    };
    value.to_string()
}
