//! Discord adapter for a multi-platform chat bridge.

pub mod config;
pub mod error;
pub mod platform;

pub use error::ChannelError;
pub use platform::discord::{ChannelOpts, DiscordChannel};
pub use platform::{Channel, ChatMetadata, InboundEvent, RegisteredGroup};
