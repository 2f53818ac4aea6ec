use once_cell::sync::Lazy;
use regex::Regex;

use crate::mappings::ChannelIndexes;

/// Reserved broadcast keyword. Wrapped in inline code on both platforms so a
/// mirrored message can never trigger a mass notification.
pub const EVERYONE_KEYWORD: &str = "@everyone";

pub(crate) static DISCORD_USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@!?(\d+)>").expect("valid regex"));
pub(crate) static DISCORD_ROLE_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@&(\d+)>").expect("valid regex"));
pub(crate) static DISCORD_CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<#(\d+)>").expect("valid regex"));
pub(crate) static STOAT_USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@([0-9A-Z]{26})>").expect("valid regex"));
pub(crate) static STOAT_CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<#([0-9A-Z]{26})>").expect("valid regex"));

/// Discord ids are decimal snowflakes.
pub fn is_discord_channel_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Stoat ids are 26-character upper-case base-32 ULIDs.
pub fn is_stoat_channel_id(id: &str) -> bool {
    id.len() == 26
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

/// Rewrites a channel id to its counterpart on the other platform. The id is
/// classified by lexical shape; an id that matches neither shape, or has no
/// mapping in the corresponding index, is returned unchanged.
pub fn convert_channel_id(id: &str, indexes: &ChannelIndexes) -> String {
    if is_discord_channel_id(id) {
        if let Some(mapped) = indexes.forward.get(id) {
            return mapped.clone();
        }
    } else if is_stoat_channel_id(id) {
        if let Some(mapped) = indexes.reverse.get(id) {
            return mapped.clone();
        }
    }
    id.to_string()
}

pub(crate) fn escape_everyone(content: &str) -> String {
    content.replace(EVERYONE_KEYWORD, "`@everyone`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn indexes() -> ChannelIndexes {
        ChannelIndexes::from_pairs([(
            "123456789".to_string(),
            "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
        )])
    }

    #[test]
    fn convert_channel_id_maps_both_directions() {
        let indexes = indexes();
        assert_eq!(
            convert_channel_id("123456789", &indexes),
            "01ARZ3NDEKTSV4RRFFQ69G5FAV"
        );
        assert_eq!(
            convert_channel_id("01ARZ3NDEKTSV4RRFFQ69G5FAV", &indexes),
            "123456789"
        );
    }

    #[test_case("not-an-id" ; "matches neither shape")]
    #[test_case("12ab34" ; "mixed digits and lowercase")]
    #[test_case("01ARZ3NDEKTSV4RRFFQ69G5FA" ; "one character short of a stoat id")]
    #[test_case("" ; "empty")]
    fn convert_channel_id_leaves_unclassifiable_ids_alone(id: &str) {
        assert_eq!(convert_channel_id(id, &indexes()), id);
    }

    #[test]
    fn convert_channel_id_leaves_unmapped_ids_alone() {
        let indexes = indexes();
        assert_eq!(convert_channel_id("987654321", &indexes), "987654321");
        assert_eq!(
            convert_channel_id("01BX5ZZKBKACTAV9WEVGEMMVRZ", &indexes),
            "01BX5ZZKBKACTAV9WEVGEMMVRZ"
        );
    }

    #[test]
    fn escape_everyone_wraps_every_occurrence() {
        assert_eq!(
            escape_everyone("hi @everyone and again @everyone"),
            "hi `@everyone` and again `@everyone`"
        );
    }
}
