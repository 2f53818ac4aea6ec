pub mod common;
pub mod discord_to_stoat;
pub mod stoat_to_discord;

pub use common::{convert_channel_id, is_discord_channel_id, is_stoat_channel_id};
pub use discord_to_stoat::format_for_stoat;
pub use stoat_to_discord::format_for_discord;
