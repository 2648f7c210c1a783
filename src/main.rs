use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use ai_consultant::pipeline::render_solution;
use ai_consultant::telemetry::init_telemetry;
use ai_consultant::{Config, ConsultRequest, Consultant, failure_message};

const SAMPLE_TITLE: &str = "社内の情報共有がうまくいかず、業務効率が低下している";
const SAMPLE_DETAIL: &str = "
部署間の連携が不足しており、同じような資料を別々の部署で作成していることがある。
過去のプロジェクト資料やノウハウが個人のPCに保存されており、担当者が不在だと誰もアクセスできない。
新しいメンバーが入社しても、必要な情報を見つけるのに時間がかかっている。
";

/// Ask an LLM consultant for solution proposals, similar cases and a cost estimate.
///
/// Prints the answer as JSON on stdout. Without --title the built-in sample
/// problem is used.
#[derive(Parser, Debug)]
#[command(name = "consult")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Problem title.
    #[arg(short, long)]
    title: Option<String>,

    /// Problem detail. Requires --title.
    #[arg(short, long, conflicts_with = "detail_file", requires = "title")]
    detail: Option<String>,

    /// Read the problem detail from a file (`-` for stdin). Requires --title.
    #[arg(long, value_name = "PATH", requires = "title")]
    detail_file: Option<PathBuf>,
}

impl Cli {
    fn into_request(self) -> anyhow::Result<ConsultRequest> {
        let detail = match (&self.detail_file, self.detail) {
            (Some(path), _) if path.as_os_str() == "-" => {
                std::io::read_to_string(std::io::stdin()).context("failed to read detail from stdin")?
            }
            (Some(path), _) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read detail file {}", path.display()))?,
            (None, Some(detail)) => detail,
            (None, None) if self.title.is_none() => SAMPLE_DETAIL.to_string(),
            (None, None) => String::new(),
        };

        Ok(ConsultRequest {
            title: self.title.unwrap_or_else(|| SAMPLE_TITLE.to_string()),
            detail,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Missing credentials stop the process here, before any client exists.
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    let request = cli.into_request()?;
    let consultant = Consultant::from_config(&config)?;

    tracing::info!(
        provider = config.llm_provider.as_str(),
        model = %config.llm_model,
        "Requesting consultation"
    );

    let outcome = consultant
        .get_solution(&request)
        .await
        .and_then(|solution| render_solution(&solution));

    let code = match outcome {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{}", failure_message(&err));
            ExitCode::FAILURE
        }
    };

    telemetry_guard.shutdown();

    Ok(code)
}
