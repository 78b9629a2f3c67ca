//! Line-based prompt/response channel to the person running the stager.

use std::io::{self, BufRead, IsTerminal, Write};

/// Answers questions during staging.
pub trait Operator {
    /// Ask `question` and return the answer without its line terminator.
    ///
    /// `None` means no answer can be obtained (non-interactive input or EOF);
    /// callers treat that as an abort.
    fn ask(&self, question: &str) -> Option<String>;

    /// Yes/no question. Only the literal `y` counts as yes.
    fn confirm(&self, question: &str) -> bool {
        matches!(self.ask(question).as_deref(), Some("y"))
    }
}

/// Prompts on stderr and reads answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalOperator {
    non_interactive: bool,
}

impl TerminalOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An operator that never answers, for unattended runs.
    pub fn non_interactive() -> Self {
        Self {
            non_interactive: true,
        }
    }
}

impl Operator for TerminalOperator {
    fn ask(&self, question: &str) -> Option<String> {
        if self.non_interactive || !io::stdin().is_terminal() {
            return None;
        }

        let mut stderr = io::stderr();
        let _ = write!(stderr, "{question}");
        let _ = stderr.flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(strip_line_ending(&line).to_string()),
        }
    }
}

fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}
