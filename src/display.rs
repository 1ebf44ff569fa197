//! Operator status line
//!
//! One line, redrawn in place: board name, the eight input levels and either
//! the retrigger countdown or the trigger notice.

use colored::*;
use std::io::{self, Write};

use crate::debounce::{Action, CooldownNotice};
use crate::packet::{ChannelStates, DeviceSnapshot};

/// Message shown after the channel levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    None,
    Cooldown(CooldownNotice),
    Triggered { cue: String },
}

impl StatusMessage {
    pub fn from_action(action: &Action, cue: &str) -> Self {
        match action {
            Action::Fire => StatusMessage::Triggered {
                cue: cue.to_string(),
            },
            Action::Display(Some(notice)) => StatusMessage::Cooldown(*notice),
            Action::Display(None) | Action::NoOp => StatusMessage::None,
        }
    }
}

/// Everything needed to draw the status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub host: String,
    pub channels: ChannelStates,
    pub message: StatusMessage,
}

impl StatusLine {
    /// Build a line for a snapshot; `None` when it has no channel data
    pub fn for_snapshot(snapshot: &DeviceSnapshot, message: StatusMessage) -> Option<Self> {
        Some(Self {
            host: snapshot.source_label().to_string(),
            channels: snapshot.channels?,
            message,
        })
    }

    pub fn render(&self) -> String {
        let mut line = format!("🕹️  {}", self.host);
        for level in self.channels.iter() {
            line.push(' ');
            line.push_str(if level { "🟩" } else { "⬛️" });
        }

        match &self.message {
            StatusMessage::None => {}
            StatusMessage::Cooldown(notice) => {
                line.push_str(&format!(
                    " Must wait {} seconds before triggering again.",
                    notice.remaining_secs().to_string().yellow()
                ));
            }
            StatusMessage::Triggered { cue } => {
                line.push_str(&format!(" Sending OSC (cue {})", cue.green().bold()));
            }
        }

        line
    }
}

/// Redraws the status line on stdout
pub struct TerminalDisplay {
    enabled: bool,
}

impl TerminalDisplay {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Clear the terminal before the first status line
    pub fn clear_screen(&self) {
        if self.enabled {
            print!("\x1B[2J\x1B[H");
            let _ = io::stdout().flush();
        }
    }

    pub fn show(&self, line: &StatusLine) {
        if !self.enabled {
            return;
        }
        print!("\r\x1B[2K{}", line.render());
        let _ = io::stdout().flush();
    }

    /// Move past the status line so later output starts on a fresh line
    pub fn finish(&self) {
        if self.enabled {
            println!();
        }
    }
}
