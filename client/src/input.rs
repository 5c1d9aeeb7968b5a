//! Console input: turns typed lines into chat events

use shared::{Button, ChatEvent, UploadContent, MAX_DATAGRAM_BYTES};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Room left in a datagram for the packet envelope and file name.
const ENVELOPE_BYTES: usize = 1024;

/// Largest file that can travel inline in one event.
pub const MAX_INLINE_UPLOAD_BYTES: usize = MAX_DATAGRAM_BYTES - ENVELOPE_BYTES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Plain text or a bot command, sent as is
    Text(String),
    /// `/file <path>`
    File(PathBuf),
    /// `/url <name> <url>`
    Url { file_name: String, url: String },
    /// `/press <n>`, 1-based
    Press(usize),
    Quit,
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("the last reply has no button {0}")]
    UnknownButton(usize),
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is {size} bytes, a single upload can carry at most {max}", path.display())]
    TooLarge { path: PathBuf, size: u64, max: usize },
}

/// Parses one typed line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "/file" => {
            if rest.is_empty() {
                return Err(InputError::Usage("/file <path>"));
            }
            ConsoleCommand::File(PathBuf::from(rest))
        }
        "/url" => match rest.split_once(char::is_whitespace) {
            Some((name, url)) if !url.trim().is_empty() => ConsoleCommand::Url {
                file_name: name.to_string(),
                url: url.trim().to_string(),
            },
            _ => return Err(InputError::Usage("/url <file name> <url>")),
        },
        "/press" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => ConsoleCommand::Press(n),
            _ => return Err(InputError::Usage("/press <button number>")),
        },
        "/quit" | "/exit" => ConsoleCommand::Quit,
        _ => ConsoleCommand::Text(line.to_string()),
    };
    Ok(Some(command))
}

/// Keeps the buttons of the latest reply so `/press` can refer to them.
pub struct InputManager {
    buttons: Vec<Button>,
    max_upload_bytes: usize,
}

impl InputManager {
    pub fn new() -> Self {
        Self::with_limit(MAX_INLINE_UPLOAD_BYTES)
    }

    pub fn with_limit(max_upload_bytes: usize) -> Self {
        Self {
            buttons: Vec::new(),
            max_upload_bytes,
        }
    }

    pub fn set_buttons(&mut self, buttons: Vec<Button>) {
        self.buttons = buttons;
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    /// Builds the event for a command. `Quit` has no event and yields `None`.
    pub async fn to_event(&self, command: ConsoleCommand) -> Result<Option<ChatEvent>, InputError> {
        let event = match command {
            ConsoleCommand::Text(text) => ChatEvent::text(text),
            ConsoleCommand::File(path) => self.load_file(&path).await?,
            ConsoleCommand::Url { file_name, url } => ChatEvent::FileUpload {
                file_name,
                // Unknown until downloaded; the bot enforces its own limit
                size_bytes: 0,
                content: UploadContent::Remote(url),
            },
            ConsoleCommand::Press(n) => {
                let button = n
                    .checked_sub(1)
                    .and_then(|idx| self.buttons.get(idx))
                    .ok_or(InputError::UnknownButton(n))?;
                ChatEvent::press(button.action)
            }
            ConsoleCommand::Quit => return Ok(None),
        };
        Ok(Some(event))
    }

    async fn load_file(&self, path: &Path) -> Result<ChatEvent, InputError> {
        let io_err = |source| InputError::Io {
            path: path.to_path_buf(),
            source,
        };

        let size = tokio::fs::metadata(path).await.map_err(io_err)?.len();
        if size > self.max_upload_bytes as u64 {
            return Err(InputError::TooLarge {
                path: path.to_path_buf(),
                size,
                max: self.max_upload_bytes,
            });
        }

        let bytes = tokio::fs::read(path).await.map_err(io_err)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(ChatEvent::inline_file(file_name, bytes))
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ButtonAction;
    use std::io::Write;
    use tokio_test::assert_err;

    #[test]
    fn test_parse_plain_text_and_commands() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(
            parse_line("/upload").unwrap(),
            Some(ConsoleCommand::Text("/upload".into()))
        );
        assert_eq!(
            parse_line(" yes ").unwrap(),
            Some(ConsoleCommand::Text("yes".into()))
        );
        assert_eq!(parse_line("/quit").unwrap(), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_file_and_url() {
        assert_eq!(
            parse_line("/file creds/a b.json").unwrap(),
            Some(ConsoleCommand::File(PathBuf::from("creds/a b.json")))
        );
        assert_eq!(
            parse_line("/url a.json https://files.test/a.json").unwrap(),
            Some(ConsoleCommand::Url {
                file_name: "a.json".into(),
                url: "https://files.test/a.json".into(),
            })
        );
        assert!(matches!(parse_line("/file"), Err(InputError::Usage(_))));
        assert!(matches!(parse_line("/url a.json"), Err(InputError::Usage(_))));
    }

    #[test]
    fn test_parse_press() {
        assert_eq!(parse_line("/press 2").unwrap(), Some(ConsoleCommand::Press(2)));
        assert_err!(parse_line("/press 0"));
        assert_err!(parse_line("/press two"));
    }

    #[tokio::test]
    async fn test_press_resolves_last_buttons() {
        let mut input = InputManager::new();
        assert!(matches!(
            input.to_event(ConsoleCommand::Press(1)).await,
            Err(InputError::UnknownButton(1))
        ));

        input.set_buttons(vec![
            Button::new("Done", ButtonAction::Finalize),
            Button::new("Cancel", ButtonAction::Cancel),
        ]);
        let event = input.to_event(ConsoleCommand::Press(2)).await.unwrap();
        assert_eq!(event, Some(ChatEvent::press(ButtonAction::Cancel)));
    }

    #[tokio::test]
    async fn test_file_upload_is_inline() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(b"{\"token\":\"abc\"}").unwrap();

        let input = InputManager::new();
        let event = input
            .to_event(ConsoleCommand::File(file.path().to_path_buf()))
            .await
            .unwrap()
            .unwrap();

        match event {
            ChatEvent::FileUpload {
                file_name,
                size_bytes,
                content,
            } => {
                assert!(file_name.ends_with(".json"));
                assert_eq!(size_bytes, 15);
                assert_eq!(content, UploadContent::Inline(b"{\"token\":\"abc\"}".to_vec()));
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_file_is_refused() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'x'; 64]).unwrap();

        let input = InputManager::with_limit(16);
        assert!(matches!(
            input
                .to_event(ConsoleCommand::File(file.path().to_path_buf()))
                .await,
            Err(InputError::TooLarge { size: 64, max: 16, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let input = InputManager::new();
        assert!(matches!(
            input
                .to_event(ConsoleCommand::File(PathBuf::from("/definitely/not/here.json")))
                .await,
            Err(InputError::Io { .. })
        ));
    }
}
