//! Stdin prompts for first-run sign-in.

use std::io::{self, BufRead, Write};

use tgrab_core::Result;
use tgrab_telegram::AuthPrompt;

pub struct StdinPrompt;

impl AuthPrompt for StdinPrompt {
    fn login_code(&self) -> Result<String> {
        ask("Login code: ")
    }

    fn password(&self, hint: &str) -> Result<String> {
        if hint.is_empty() {
            ask("2FA password: ")
        } else {
            ask(&format!("2FA password (hint: {hint}): "))
        }
    }
}

fn ask(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
