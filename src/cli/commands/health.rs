use crate::cli::client::ApiClient;
use crate::cli::utils::output_value;
use crate::cli::OutputFormat;

pub async fn handle(client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let health = client.get("/health", &[]).await?;
    if output_format == OutputFormat::Text {
        println!("Server: {}", client.base());
    }
    output_value(output_format, &health)
}
