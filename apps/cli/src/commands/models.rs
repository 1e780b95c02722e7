//! Models command implementation.

use anyhow::Result;
use colored::Colorize;
use gemlink_abstraction::Credentials;
use gemlink_orchestrator::Orchestrator;

/// Execute the models command: print the candidate models a request would try.
pub async fn execute(
    orchestrator: &Orchestrator,
    credentials: &Credentials,
    image: bool,
    json: bool,
) -> Result<()> {
    let models = orchestrator.candidates(image, credentials).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        eprintln!("{}", "No candidate models available".yellow());
        return Ok(());
    }
    if !credentials.is_present() {
        eprintln!("{}", "No API key set; showing the static preference list".yellow());
    }
    for model in models {
        println!("{model}");
    }
    Ok(())
}
