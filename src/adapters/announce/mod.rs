//! Announcement adapters. Implement AnnouncerPort.
//!
//! Webhook (Discord-compatible embeds) for real channels, log-only otherwise.

pub mod log_announcer;
pub mod webhook;

pub use log_announcer::LogAnnouncer;
pub use webhook::WebhookAnnouncer;
