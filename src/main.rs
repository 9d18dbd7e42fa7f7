mod cli;

use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, OutputFormat};
use xshot_lib::{
    CaptureEngine, CaptureRequest, ChromiumLauncher, Config, ErrorPayload, RegionMatch,
    XshotError,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_INVALID_INPUT: u8 = 2;
const EXIT_ENVIRONMENT: u8 = 3;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaptureOutput {
    post: String,
    output: PathBuf,
    width: u32,
    height: u32,
    exact_match: bool,
    converged: bool,
    expanded: usize,
    elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureOutput {
    retryable: bool,
    error: ErrorPayload,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("xshot={default_level},xshot_lib={default_level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    let format = args.format;
    match run(args).await {
        Ok(output) => {
            match format {
                OutputFormat::Json => match serde_json::to_string_pretty(&output) {
                    Ok(json) => println!("{json}"),
                    Err(err) => eprintln!("Failed to serialize output: {err}"),
                },
                OutputFormat::Text => println!(
                    "Saved {} ({}x{}) to {}",
                    output.post,
                    output.width,
                    output.height,
                    output.output.display()
                ),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_failure(&err, format);
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(args: Cli) -> Result<CaptureOutput, XshotError> {
    let request = CaptureRequest::from_url(&args.url, args.theme.into())?;
    let config = Config::load(args.config.as_deref())?;

    let launcher = ChromiumLauncher::detect(config.browser.executable.as_deref()).await?;
    let engine = CaptureEngine::new(launcher, config);
    let result = engine.capture(&request).await?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(request.post().file_name()));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output, result.png())?;

    let (width, height) = result.dimensions();
    Ok(CaptureOutput {
        post: result.post().canonical_url(),
        output,
        width,
        height,
        exact_match: result.region() == RegionMatch::Exact,
        converged: result.stability().converged,
        expanded: result.expansion().activated,
        elapsed_ms: result.elapsed().as_millis() as u64,
    })
}

fn exit_code(err: &XshotError) -> u8 {
    match err {
        XshotError::InvalidTarget { .. } | XshotError::Config(_) => EXIT_INVALID_INPUT,
        XshotError::EnvironmentNotReady(_) => EXIT_ENVIRONMENT,
        _ => EXIT_FAILURE,
    }
}

fn report_failure(err: &XshotError, format: OutputFormat) {
    let payload = err.to_payload();
    match format {
        OutputFormat::Json => {
            let failure = FailureOutput {
                retryable: err.is_retryable(),
                error: payload,
            };
            match serde_json::to_string_pretty(&failure) {
                Ok(json) => println!("{json}"),
                Err(ser_err) => eprintln!("Error: {err} (serialization failed: {ser_err})"),
            }
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", payload.message);
            if let Some(hint) = payload.remediation {
                eprintln!("Hint: {hint}");
            }
        }
    }
}
