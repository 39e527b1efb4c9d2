//! System clipboard with command-line fallbacks for headless sessions.

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};

/// How long arboard keeps serving the selection when no helper tool is
/// installed. X11 and Wayland drop a selection together with its owner.
#[cfg(all(unix, not(target_os = "macos")))]
const SELECTION_HOLD: std::time::Duration = std::time::Duration::from_secs(30);

/// Puts `text` on the system clipboard.
///
/// `xclip` and `wl-copy` fork a process that keeps serving the selection
/// after we exit, so they are tried before arboard.
#[cfg(all(unix, not(target_os = "macos")))]
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    use arboard::SetExtLinux;

    match copy_with_commands(text) {
        Ok(()) => return Ok(()),
        Err(err) => tracing::debug!(error = %err, "no clipboard command available, using arboard"),
    }

    let mut clipboard = arboard::Clipboard::new().context("system clipboard is unavailable")?;
    tracing::info!(
        seconds = SELECTION_HOLD.as_secs(),
        "holding the clipboard until another application takes it"
    );
    clipboard
        .set()
        .wait_until(std::time::Instant::now() + SELECTION_HOLD)
        .text(text.to_owned())
        .context("failed to write to the system clipboard")
}

/// Puts `text` on the system clipboard.
#[cfg(not(all(unix, not(target_os = "macos"))))]
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let copied = arboard::Clipboard::new()
        .and_then(|mut clipboard| clipboard.set_text(text.to_owned()));
    match copied {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = %err, "arboard failed, trying clipboard commands");
            copy_with_commands(text)
        }
    }
}

fn copy_with_commands(text: &str) -> Result<()> {
    let mut last_error = None;
    for command in clipboard_commands() {
        match try_command_copy(command, text) {
            Ok(()) => {
                tracing::debug!(program = command[0], "copied with clipboard command");
                return Ok(());
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("no clipboard command for this platform")))
}

fn try_command_copy(command: &[&str], text: &str) -> Result<()> {
    let (program, args) = command
        .split_first()
        .context("clipboard command missing program")?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn clipboard command {program}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .context("failed to write clipboard contents")?;
    }

    let status = child
        .wait()
        .with_context(|| format!("clipboard command {program} did not exit cleanly"))?;
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("clipboard command {program} exited with {status}"))
    }
}

#[cfg(target_os = "macos")]
fn clipboard_commands() -> Vec<&'static [&'static str]> {
    vec![&["pbcopy"]]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn clipboard_commands() -> Vec<&'static [&'static str]> {
    vec![&["xclip", "-selection", "clipboard"], &["wl-copy"]]
}

#[cfg(target_os = "windows")]
fn clipboard_commands() -> Vec<&'static [&'static str]> {
    vec![&["powershell.exe", "-NoProfile", "-Command", "Set-Clipboard"]]
}

#[cfg(not(any(unix, target_os = "windows")))]
fn clipboard_commands() -> Vec<&'static [&'static str]> {
    Vec::new()
}
