#![forbid(unsafe_code)]

pub mod app;

use std::io;
use std::io::IsTerminal as _;

use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::error::TasklistError;

pub type Term = Terminal<CrosstermBackend<io::Stdout>>;

#[must_use]
pub fn is_tty() -> bool {
    io::stdout().is_terminal()
}

pub fn init_terminal() -> Result<Term, TasklistError> {
    use crossterm::terminal::enable_raw_mode;

    enable_raw_mode()
        .map_err(|e| TasklistError::Other(format!("failed to enable raw mode: {e}")))?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)
        .map_err(|e| TasklistError::Other(format!("failed to enter alt screen: {e}")))?;
    Terminal::new(CrosstermBackend::new(stdout))
        .map_err(|e| TasklistError::Other(format!("failed to create terminal: {e}")))
}

pub fn restore_terminal(mut terminal: Term) -> Result<(), TasklistError> {
    use crossterm::terminal::disable_raw_mode;

    disable_raw_mode()
        .map_err(|e| TasklistError::Other(format!("failed to disable raw mode: {e}")))?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )
    .map_err(|e| TasklistError::Other(format!("failed to leave alt screen: {e}")))?;
    terminal
        .show_cursor()
        .map_err(|e| TasklistError::Other(format!("failed to show cursor: {e}")))
}

/// Restores the terminal on drop, including on early returns and panics unwinding.
pub(crate) struct TerminalGuard {
    pub(crate) terminal: Option<Term>,
}

impl TerminalGuard {
    pub(crate) fn new(terminal: Term) -> Self {
        Self {
            terminal: Some(terminal),
        }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(terminal) = self.terminal.take() {
            let _ = restore_terminal(terminal);
        }
    }
}
