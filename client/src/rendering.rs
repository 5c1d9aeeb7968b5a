use shared::{Button, Reply};
use std::io::{self, Write};

pub const CONSOLE_HELP: &str = "\
Console commands:
  /file <path>         upload a local credential file
  /url <name> <url>    upload a file the bot downloads itself
  /press <n>           press button n of the last reply
  /quit                disconnect and exit
Anything else is sent to the bot as text (try /help).";

/// Writes replies and notices to a terminal-like sink.
pub struct Renderer<W: Write> {
    out: W,
}

impl Renderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn render_reply(&mut self, reply: &Reply) -> io::Result<()> {
        writeln!(self.out, "{}", format_reply(reply))?;
        self.out.flush()
    }

    pub fn render_notice(&mut self, notice: &str) -> io::Result<()> {
        writeln!(self.out, "* {}", notice)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_reply(reply: &Reply) -> String {
    let mut text = reply.text.clone();
    if !reply.buttons.is_empty() {
        text.push('\n');
        text.push_str(&format_buttons(&reply.buttons));
    }
    text
}

/// Numbered button row, matching what `/press <n>` expects.
pub fn format_buttons(buttons: &[Button]) -> String {
    buttons
        .iter()
        .enumerate()
        .map(|(idx, button)| format!("[{}] {}", idx + 1, button.label))
        .collect::<Vec<_>>()
        .join("  ")
}
