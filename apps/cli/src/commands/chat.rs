//! Interactive chat loop.
//!
//! Each line is sent as an independent prompt; no history is kept. `/image <prompt>`
//! asks for an image, `/quit` (or end of input) exits.

use super::{default_image_path, write_image};
use anyhow::Result;
use colored::Colorize;
use gemlink_abstraction::{Credentials, GenerationRequest, NormalizedResult};
use gemlink_orchestrator::Orchestrator;
use std::io::{self, BufRead, Write};

/// A parsed line of chat input.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput {
    /// Send the prompt as a text request.
    Text(String),
    /// Send the prompt as an image request.
    Image(String),
    /// Leave the loop.
    Quit,
    /// Nothing to do.
    Empty,
}

/// Parses one input line.
pub fn parse_line(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    if line == "/quit" || line == "/exit" {
        return ChatInput::Quit;
    }
    if let Some(rest) = line.strip_prefix("/image") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            let prompt = rest.trim();
            return if prompt.is_empty() { ChatInput::Empty } else { ChatInput::Image(prompt.to_string()) };
        }
    }
    ChatInput::Text(line.to_string())
}

/// Execute the chat command.
pub async fn execute(orchestrator: &Orchestrator, credentials: &Credentials) -> Result<()> {
    println!("{}", "gemlink chat".bold().cyan());
    println!("{}", "Type a prompt, /image <prompt> for an image, /quit to exit.".dimmed());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut images_saved = 0usize;

    loop {
        print!("{} ", ">".bold());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };

        let request = match parse_line(&line?) {
            ChatInput::Quit => break,
            ChatInput::Empty => continue,
            ChatInput::Text(prompt) => GenerationRequest::text(prompt),
            ChatInput::Image(prompt) => GenerationRequest::image(prompt),
        };

        let result = orchestrator.generate(&request, credentials).await;
        match &result {
            NormalizedResult::Text { value } => println!("{value}"),
            NormalizedResult::Image { mime_type, .. } => {
                images_saved += 1;
                let path = default_image_path(&format!("gemlink-image-{images_saved}"), mime_type);
                match write_image(&result, &path) {
                    Ok(size) => println!("{} {} ({} bytes)", "Saved image to".green(), path.display(), size),
                    Err(e) => eprintln!("{} {e:#}", "Error:".red()),
                }
            }
            NormalizedResult::Error { message } => eprintln!("{} {}", "Error:".red(), message),
        }
    }

    Ok(())
}
