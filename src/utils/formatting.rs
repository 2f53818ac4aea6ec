/// Normalizes a channel name into the lowercase hyphenated slug used when
/// deriving webhook names.
pub fn slugify_channel_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::slugify_channel_name;
    use test_case::test_case;

    #[test_case("General Chat", "general-chat")]
    #[test_case("general", "general")]
    #[test_case("  Spaced   Out  ", "spaced-out")]
    #[test_case("MiXeD Case Name", "mixed-case-name")]
    fn slugs_are_lowercase_and_hyphenated(input: &str, expected: &str) {
        assert_eq!(slugify_channel_name(input), expected);
    }
}
