// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const SESSIONS_ACTIVE: &str = "sessions.active";
pub const SUBSCRIBERS_ACTIVE: &str = "subscribers.active";
pub const STATUS_PUSHED: &str = "status.pushed";
pub const STATUS_DROPPED: &str = "status.dropped";
pub const COMMANDS_HANDLED: &str = "commands.handled";
pub const CAMERA_FAILURES: &str = "camera.failures";
