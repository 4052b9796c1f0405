//! Single-line terminal status display.

use std::io::{Stdout, Write};

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use owl_hal::{Feedback, FeedbackSink};
use owl_types::Mode;
use tracing::debug;

/// Redraws one status line per tick.
pub struct StatusLine<W: Write> {
    out: W,
}

impl StatusLine<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> StatusLine<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn mode_label(mode: Mode) -> ColoredString {
    match mode {
        Mode::Idle => mode.label().dimmed(),
        Mode::ColorTrack => mode.label().green().bold(),
        Mode::PointFocus => mode.label().blue().bold(),
        _ => mode.label().cyan().bold(),
    }
}

/// The text of one status line.
pub(crate) fn format_status(feedback: &Feedback<'_>) -> String {
    let video = if feedback.frame.is_some() {
        "video ok".green()
    } else {
        "video stall".yellow()
    };
    let link = if feedback.link_ok {
        "link ok".green()
    } else {
        "link down".red().bold()
    };
    let mut line = format!(
        "#{:<6} {:<16} [{}]  {}  {}",
        feedback.tick,
        mode_label(feedback.mode),
        feedback.command,
        video,
        link
    );
    if let Some(obs) = feedback.observation {
        let eye = |p: Option<owl_types::ImagePoint>| match p {
            Some(p) => format!("({:.0},{:.0})", p.x, p.y),
            None => "-".to_string(),
        };
        line.push_str(&format!("  target R{} L{}", eye(obs.right), eye(obs.left)));
    }
    if feedback.converged {
        line.push_str(&format!("  {}", "converged".blue()));
    }
    line
}

impl<W: Write> FeedbackSink for StatusLine<W> {
    fn render(&mut self, feedback: &Feedback<'_>) {
        let line = format_status(feedback);
        let drawn = queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(line)
        )
        .and_then(|()| self.out.flush());
        if let Err(e) = drawn {
            debug!(error = %e, "status line not drawn");
        }
    }

    fn close(&mut self) {
        let _ = write!(self.out, "\r\n").and_then(|()| self.out.flush());
    }
}
