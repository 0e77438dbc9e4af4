use std::io::{self, BufRead, Write};

use anyhow::Context;
use tracing::debug;

/// Asks the user before destructive commands run.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> anyhow::Result<bool>;

    /// Whether answers come from stdin, which then cannot also carry data.
    fn reads_stdin(&self) -> bool {
        false
    }
}

/// Always gives the same answer; `--yes` and `confirmation=off` use
/// `FixedAnswer(true)`.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&mut self, question: &str) -> anyhow::Result<bool> {
        debug!(question, answer = self.0, "confirmation answered without prompting");
        Ok(self.0)
    }
}

/// Prompts on stderr and reads one line from stdin. Anything other than
/// `y`/`yes` (including end of input) declines.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Confirm for StdinPrompt {
    fn confirm(&mut self, question: &str) -> anyhow::Result<bool> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{question} (yes/no) ")?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("failed reading confirmation")?;
        Ok(is_yes(&answer))
    }

    fn reads_stdin(&self) -> bool {
        true
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
