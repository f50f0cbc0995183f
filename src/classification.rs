//! Channel category classification
//!
//! Pure, deterministic mapping of `(url, group, name)` to a
//! [`ChannelCategory`]. Rules are tried in order and the first match wins:
//!
//! 1. Adult keywords anywhere in url, group or name
//! 2. `/series/` or `/movie/` in the URL
//! 3. A URL ending in a video file extension (series if the name or group
//!    looks like an episode, movie otherwise)
//! 4. Any other non-blank URL is live TV
//! 5. Group title hints (`vod`, `movie`, `film`, `series`, `show`, `mu|`)
//! 6. Name and group keywords
//! 7. Everything else is [`ChannelCategory::Other`]
//!
//! Keyword matching is case-insensitive substring matching.

use std::sync::OnceLock;

use regex::{Regex, RegexSet};

use crate::models::ChannelCategory;

const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".avi", ".mov", ".flv", ".wmv", ".m4v", ".mpg", ".mpeg", ".ts",
];

const MOVIE_KEYWORDS: &[&str] = &["movie", "film", "cinema", "feature"];

const LIVE_KEYWORDS: &[&str] = &[
    "live",
    "tv",
    "television",
    "channel",
    "broadcast",
    "streaming",
    "iptv",
    "sport",
    "news",
    "music",
    "radio",
    "hd",
    "fhd",
    "4k",
    "uhd",
    "bein",
    "sky",
    "espn",
    "cnn",
    "bbc",
    "fox",
];

fn adult_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)adult|xxx|porn|18\+|18 plus|erotic|sex|nsfw|mature")
            .expect("static regex is valid")
    })
}

fn episode_patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"(?i)s\d+\s*e\d+",
            r"(?i)season\s*\d+",
            r"(?i)episode\s*\d+",
            r"(?i)ep\s*\d+",
            r"(?i)saison\s*\d+",
            r"(?i)episodio\s*\d+",
            r"(?i)temporada\s*\d+",
        ])
        .expect("static regex set is valid")
    })
}

/// Classify a channel from its stream URL, group title and display name
pub fn classify(url: &str, group: Option<&str>, name: &str) -> ChannelCategory {
    let url_lower = url.trim().to_lowercase();
    let group_lower = group.unwrap_or_default().to_lowercase();
    let name_lower = name.to_lowercase();
    let search_text = format!("{name_lower} {group_lower}");

    if is_adult(&url_lower) || is_adult(&group_lower) || is_adult(&name_lower) {
        return ChannelCategory::Adult;
    }

    if url_lower.contains("/series/") {
        return ChannelCategory::Series;
    }
    if url_lower.contains("/movie/") {
        return ChannelCategory::Movies;
    }
    if has_video_extension(&url_lower) {
        return vod_category(&search_text);
    }
    if !url_lower.is_empty() {
        return ChannelCategory::LiveTv;
    }

    if ["vod", "movie", "film"]
        .iter()
        .any(|hint| group_lower.contains(hint))
    {
        return vod_category(&search_text);
    }
    if group_lower.contains("series") || group_lower.contains("show") {
        return ChannelCategory::Series;
    }
    if group_lower.starts_with("mu|") {
        return vod_category(&search_text);
    }

    if is_episode(&search_text) {
        ChannelCategory::Series
    } else if contains_any(&search_text, MOVIE_KEYWORDS) {
        ChannelCategory::Movies
    } else if contains_any(&search_text, LIVE_KEYWORDS) {
        ChannelCategory::LiveTv
    } else {
        ChannelCategory::Other
    }
}

fn is_adult(text: &str) -> bool {
    !text.is_empty() && (adult_regex().is_match(text) || text.contains("adults only"))
}

fn has_video_extension(url: &str) -> bool {
    VIDEO_EXTENSIONS.iter().any(|ext| url.ends_with(ext))
}

fn is_episode(text: &str) -> bool {
    episode_patterns().is_match(text)
}

fn vod_category(search_text: &str) -> ChannelCategory {
    if is_episode(search_text) {
        ChannelCategory::Series
    } else {
        ChannelCategory::Movies
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://x.com/movie/u/p/123.mp4", None, "X", ChannelCategory::Movies)]
    #[case("http://x.com/movies/u/p/123", None, "X", ChannelCategory::LiveTv)]
    #[case("http://x.com/series/1/2/3.mp4", None, "X", ChannelCategory::Series)]
    #[case("http://x.com/live/u/p/1.ts", Some("News"), "CNN", ChannelCategory::Movies)]
    #[case("http://x.com/vod/show.mkv", None, "Lost S01E02", ChannelCategory::Series)]
    #[case("http://x.com/vod/show.mkv", None, "Dark Temporada 2", ChannelCategory::Series)]
    #[case("http://x.com/live/a.mp4?token=1", None, "X", ChannelCategory::LiveTv)]
    #[case("http://x.com/vod/film.mp4", None, "Inception", ChannelCategory::Movies)]
    #[case("http://x.com/live/1", Some("UK"), "BBC One", ChannelCategory::LiveTv)]
    #[case("http://x.com/live/1", None, "", ChannelCategory::LiveTv)]
    fn test_url_rules(
        #[case] url: &str,
        #[case] group: Option<&str>,
        #[case] name: &str,
        #[case] expected: ChannelCategory,
    ) {
        assert_eq!(classify(url, group, name), expected);
    }

    #[rstest]
    #[case("http://x.com/movie/1.mp4", Some("XXX Hot"), "X")]
    #[case("http://x.com/live/1", None, "Adults Only 24/7")]
    #[case("http://adult.example.com/live/1", None, "Channel")]
    #[case("http://x.com/series/1.mp4", Some("18+"), "Show")]
    #[case("http://x.com/live/1", None, "Sexy Time")]
    fn test_adult_keywords_win(
        #[case] url: &str,
        #[case] group: Option<&str>,
        #[case] name: &str,
    ) {
        assert_eq!(classify(url, group, name), ChannelCategory::Adult);
    }

    #[rstest]
    #[case("http://x.com/live/1", None, "BBC Essex")]
    #[case("", Some("Unisex"), "Fashion")]
    fn test_sex_matches_inside_words(
        #[case] url: &str,
        #[case] group: Option<&str>,
        #[case] name: &str,
    ) {
        assert_eq!(classify(url, group, name), ChannelCategory::Adult);
    }

    #[rstest]
    #[case(Some("VOD | Action"), "Die Hard", ChannelCategory::Movies)]
    #[case(Some("Films"), "Friends Season 3", ChannelCategory::Series)]
    #[case(Some("TV Shows"), "Friends", ChannelCategory::Series)]
    #[case(Some("MU| Drama"), "Something", ChannelCategory::Movies)]
    #[case(None, "Lost Episode 4", ChannelCategory::Series)]
    #[case(None, "Cinema Classics", ChannelCategory::Movies)]
    #[case(Some("Sports"), "Arena", ChannelCategory::LiveTv)]
    #[case(None, "Untitled", ChannelCategory::Other)]
    #[case(None, "", ChannelCategory::Other)]
    fn test_blank_url_falls_back_to_group_and_name(
        #[case] group: Option<&str>,
        #[case] name: &str,
        #[case] expected: ChannelCategory,
    ) {
        assert_eq!(classify("", group, name), expected);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let first = classify("http://x.com/vod/a.mkv", Some("VOD"), "A S1 E2");
        let second = classify("http://x.com/vod/a.mkv", Some("VOD"), "A S1 E2");
        assert_eq!(first, second);
        assert_eq!(first, ChannelCategory::Series);
    }
}
