use std::collections::HashMap;

use crate::bridge::event::{MentionEntity, MentionKind};
use crate::mappings::ChannelIndexes;

use super::common::{
    convert_channel_id, escape_everyone, DISCORD_CHANNEL_MENTION, DISCORD_ROLE_MENTION,
    DISCORD_USER_MENTION,
};

/// Translates Discord message markup into Stoat markup. Best effort on every
/// step: unresolved mentions and unmapped channels keep their raw tokens.
///
/// Order matters — mention resolution runs before the broadcast escape so a
/// resolved display name containing the keyword still gets neutralized.
pub fn format_for_stoat(
    content: &str,
    mentions: &[MentionEntity],
    indexes: &ChannelIndexes,
) -> String {
    let users: HashMap<&str, &str> = mentions
        .iter()
        .filter(|entity| entity.kind == MentionKind::User)
        .map(|entity| (entity.id.as_str(), entity.name.as_str()))
        .collect();
    let roles: HashMap<&str, &str> = mentions
        .iter()
        .filter(|entity| entity.kind == MentionKind::Role)
        .map(|entity| (entity.id.as_str(), entity.name.as_str()))
        .collect();

    let content = DISCORD_USER_MENTION.replace_all(content, |caps: &regex::Captures<'_>| {
        match users.get(&caps[1]) {
            Some(name) => format!("@{name}"),
            None => caps[0].to_string(),
        }
    });
    let content = DISCORD_ROLE_MENTION.replace_all(&content, |caps: &regex::Captures<'_>| {
        match roles.get(&caps[1]) {
            Some(name) => format!("@{name}"),
            None => caps[0].to_string(),
        }
    });
    let content = DISCORD_CHANNEL_MENTION.replace_all(&content, |caps: &regex::Captures<'_>| {
        format!("<#{}>", convert_channel_id(&caps[1], indexes))
    });
    let content = content.replace("||", "!!");
    escape_everyone(&content)
}
