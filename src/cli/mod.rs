pub mod client;
pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use client::ApiClient;

#[derive(Parser)]
#[command(name = "kyb")]
#[command(about = "KYB CLI - Submit and track background jobs on a KYB Jobs API server")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        env = "KYB_API_URL",
        default_value = "http://127.0.0.1:3000",
        help = "Base URL of the API server"
    )]
    pub server: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Manage background jobs")]
    Jobs {
        #[command(subcommand)]
        cmd: commands::jobs::JobsCommands,
    },

    #[command(about = "Check server health status from the /health endpoint")]
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let client = ApiClient::new(&cli.server)?;

    match cli.command {
        Commands::Jobs { cmd } => commands::jobs::handle(cmd, &client, output_format).await,
        Commands::Health => commands::health::handle(&client, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_selects_json_output() {
        let cli = Cli::parse_from(["kyb", "--json", "--server", "http://localhost:9", "health"]);
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);
        assert_eq!(cli.server, "http://localhost:9");
    }

    #[test]
    fn submit_parses_repeated_params() {
        let cli = Cli::parse_from([
            "kyb",
            "jobs",
            "submit",
            "report",
            "--business-id",
            "biz-1",
            "--param",
            "report_type=compliance_summary",
            "--param",
            "format=csv",
        ]);
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Text);
        match cli.command {
            Commands::Jobs {
                cmd: commands::jobs::JobsCommands::Submit { job_type, business_id, param, .. },
            } => {
                assert_eq!(job_type, "report");
                assert_eq!(business_id, "biz-1");
                assert_eq!(param.len(), 2);
            }
            _ => panic!("expected jobs submit"),
        }
    }
}
