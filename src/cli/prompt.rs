use std::io::{BufRead, IsTerminal, Write};
use std::sync::Mutex;
use tracing::info;

use crate::archive::{DecisionSource, RawDataset};
use crate::models::RetrievalUnit;

/// `Some(true)` keeps existing data, `Some(false)` downloads again
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Asks on the terminal; keeps existing data when stdin is not a terminal
#[derive(Default)]
pub struct ConsoleDecision {
    // One question at a time when units run concurrently
    console: Mutex<()>,
}

impl ConsoleDecision {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionSource for ConsoleDecision {
    fn keep_existing(&self, unit: &RetrievalUnit, existing: &RawDataset) -> bool {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            info!("No terminal attached, keeping existing raw data for {}", unit);
            return true;
        }

        let _console = self.console.lock().unwrap_or_else(|e| e.into_inner());
        let mut stderr = std::io::stderr();
        loop {
            let _ = write!(
                stderr,
                "Raw data for {} already exists ({} members, {} bytes, fetched {}). Keep it? [Y/n] ",
                unit,
                existing.members.len(),
                existing.size,
                existing.fetched_at.format("%Y-%m-%d %H:%M UTC")
            );
            let _ = stderr.flush();

            let mut answer = String::new();
            match stdin.lock().read_line(&mut answer) {
                Ok(0) | Err(_) => return true,
                Ok(_) => {}
            }
            if let Some(keep) = parse_answer(&answer) {
                return keep;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("\n"), Some(true));
        assert_eq!(parse_answer(" Yes "), Some(true));
        assert_eq!(parse_answer("n"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
    }
}
