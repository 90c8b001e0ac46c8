// ============================
// glasscast-backend-lib/src/commands.rs
// ============================
//! Voice/tool commands: `start_streaming` and `stop_streaming`.
//!
//! Commands never fail outward. Missing sessions and camera errors come back
//! as a [`CommandReply`] with `ok == false` and text meant to be spoken or
//! shown on the glasses.
use glasscast_common::CommandReply;
use metrics::counter;
use tracing::{debug, info};

use crate::controller::{SessionController, StopOutcome};
use crate::error::AppError;
use crate::metrics::COMMANDS_HANDLED;

pub const NO_SESSION_REPLY: &str = "No active glasses session.";
pub const STARTED_REPLY: &str = "Streaming started.";
pub const STOPPED_REPLY: &str = "Streaming stopped.";
pub const NOTHING_TO_STOP_REPLY: &str = "No stream is running, nothing to stop.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCommand {
    StartStreaming,
    StopStreaming,
}

impl ToolCommand {
    /// Exact match on the tool identifier
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "start_streaming" => Some(ToolCommand::StartStreaming),
            "stop_streaming" => Some(ToolCommand::StopStreaming),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            ToolCommand::StartStreaming => "start_streaming",
            ToolCommand::StopStreaming => "stop_streaming",
        }
    }

    /// Find a spoken command in a transcript, ignoring case and punctuation
    pub fn from_transcript(text: &str) -> Option<Self> {
        let normalized = text
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
            .collect::<String>();
        let words = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        let start = words.find("start streaming");
        let stop = words.find("stop streaming");
        match (start, stop) {
            (Some(s), Some(t)) if t < s => Some(ToolCommand::StopStreaming),
            (Some(_), _) => Some(ToolCommand::StartStreaming),
            (None, Some(_)) => Some(ToolCommand::StopStreaming),
            (None, None) => None,
        }
    }
}

/// Run a tool call by identifier; `None` for identifiers this server does not know
pub async fn handle_tool_call(
    controller: &SessionController,
    user_id: &str,
    tool_id: &str,
) -> Option<CommandReply> {
    let Some(command) = ToolCommand::from_id(tool_id) else {
        debug!(user_id, tool_id, "unsupported tool call");
        return None;
    };
    Some(execute(controller, user_id, command).await)
}

/// Run a command spotted in a final transcript and show the reply on the glasses
pub async fn handle_transcript(
    controller: &SessionController,
    user_id: &str,
    text: &str,
) -> Option<CommandReply> {
    let command = ToolCommand::from_transcript(text)?;
    let reply = execute(controller, user_id, command).await;

    if let Some(session) = controller.registry().get(user_id) {
        if let Err(e) = session.show_text(&reply.message).await {
            debug!(user_id, error = %e, "could not show command reply");
        }
    }
    Some(reply)
}

pub async fn execute(controller: &SessionController, user_id: &str, command: ToolCommand) -> CommandReply {
    let reply = match command {
        ToolCommand::StartStreaming => match controller.start_stream(user_id, None).await {
            Ok(_) => CommandReply::ok(STARTED_REPLY),
            Err(e) => failure_reply("start", e),
        },
        ToolCommand::StopStreaming => match controller.stop_stream(user_id).await {
            Ok(StopOutcome::Stopped) => CommandReply::ok(STOPPED_REPLY),
            Ok(StopOutcome::NothingToStop) => CommandReply::ok(NOTHING_TO_STOP_REPLY),
            Err(e) => failure_reply("stop", e),
        },
    };

    counter!(COMMANDS_HANDLED, "command" => command.id(), "ok" => reply.ok.to_string()).increment(1);
    info!(user_id, command = command.id(), ok = reply.ok, "tool command handled");
    reply
}

fn failure_reply(action: &str, err: AppError) -> CommandReply {
    match err {
        AppError::NoActiveSession(_) => CommandReply::failed(NO_SESSION_REPLY),
        AppError::Camera(e) => CommandReply::failed(format!("Failed to {action} streaming: {e}")),
        other => CommandReply::failed(format!("Failed to {action} streaming: {}", other.sanitized_message())),
    }
}
