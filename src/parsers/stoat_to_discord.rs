use std::collections::HashMap;

use crate::bridge::event::MentionEntity;
use crate::mappings::ChannelIndexes;

use super::common::{
    convert_channel_id, escape_everyone, STOAT_CHANNEL_MENTION, STOAT_USER_MENTION,
};

/// Translates Stoat message markup into Discord markup. The mirror image of
/// [`format_for_stoat`](super::format_for_stoat): same step order, inverse
/// spoiler delimiters, reverse-index channel rewriting.
pub fn format_for_discord(
    content: &str,
    mentions: &[MentionEntity],
    indexes: &ChannelIndexes,
) -> String {
    let names: HashMap<&str, &str> = mentions
        .iter()
        .map(|entity| (entity.id.as_str(), entity.name.as_str()))
        .collect();

    let content = STOAT_USER_MENTION.replace_all(content, |caps: &regex::Captures<'_>| {
        match names.get(&caps[1]) {
            Some(name) => format!("@{name}"),
            None => caps[0].to_string(),
        }
    });
    let content = STOAT_CHANNEL_MENTION.replace_all(&content, |caps: &regex::Captures<'_>| {
        format!("<#{}>", convert_channel_id(&caps[1], indexes))
    });
    let content = content.replace("!!", "||");
    escape_everyone(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::event::MentionKind;
    use crate::parsers::format_for_stoat;

    const STOAT_USER: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn indexes() -> ChannelIndexes {
        ChannelIndexes::from_pairs([(
            "555555".to_string(),
            "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
        )])
    }

    #[test]
    fn resolves_user_mentions_to_display_names() {
        let mentions = vec![MentionEntity {
            id: STOAT_USER.to_string(),
            name: "bob".to_string(),
            kind: MentionKind::User,
        }];
        let out = format_for_discord(&format!("hi <@{STOAT_USER}>"), &mentions, &indexes());
        assert_eq!(out, "hi @bob");
    }

    #[test]
    fn unresolved_mentions_keep_their_raw_token() {
        let raw = format!("hi <@{STOAT_USER}>");
        assert_eq!(format_for_discord(&raw, &[], &indexes()), raw);
    }

    #[test]
    fn rewrites_mapped_channel_mentions() {
        let out = format_for_discord("see <#01ARZ3NDEKTSV4RRFFQ69G5FAV>", &[], &indexes());
        assert_eq!(out, "see <#555555>");
    }

    #[test]
    fn converts_spoiler_delimiters() {
        let out = format_for_discord("a !!secret!! here", &[], &indexes());
        assert_eq!(out, "a ||secret|| here");
    }

    #[test]
    fn escapes_every_broadcast_mention() {
        let out = format_for_discord("@everyone ping", &[], &indexes());
        assert_eq!(out, "`@everyone` ping");
    }

    #[test]
    fn spoiler_spans_round_trip_between_dialects() {
        let indexes = indexes();
        for original in [
            "no spoilers here",
            "one ||hidden|| span",
            "||first|| and ||second|| spans",
        ] {
            let stoat = format_for_stoat(original, &[], &indexes);
            let back = format_for_discord(&stoat, &[], &indexes);
            assert_eq!(back, original);
        }
    }
}
