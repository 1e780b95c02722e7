//! One-shot prompt command.

use super::{default_image_path, write_image};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use gemlink_abstraction::{Credentials, GenerationRequest, NormalizedResult};
use gemlink_orchestrator::Orchestrator;
use std::path::PathBuf;
use tracing::debug;

/// Execute the ask command.
///
/// Text is printed to stdout (or written to `output`); images are written to
/// `output` or `gemlink-image.<ext>`. An error result makes the command fail.
pub async fn execute(
    orchestrator: &Orchestrator,
    credentials: &Credentials,
    prompt: String,
    image: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let request = if image { GenerationRequest::image(prompt) } else { GenerationRequest::text(prompt) };
    let report = orchestrator.generate_with_report(&request, credentials).await;
    debug!(model = ?report.succeeded_model(), attempts = report.attempts.len(), "Request finished");

    match &report.result {
        NormalizedResult::Text { value } => match output {
            Some(path) => {
                std::fs::write(&path, value).with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("{} {}", "Saved text to".green(), path.display());
            }
            None => println!("{value}"),
        },
        NormalizedResult::Image { mime_type, .. } => {
            let path = output.unwrap_or_else(|| default_image_path("gemlink-image", mime_type));
            let size = write_image(&report.result, &path)?;
            println!("{} {} ({} bytes, {})", "Saved image to".green(), path.display(), size, mime_type);
        }
        NormalizedResult::Error { message } => bail!("{message}"),
    }
    Ok(())
}
