//! Parsers for research and media discovery responses. These never fail:
//! missing sections and unmatched lines simply produce less data.

use std::sync::LazyLock;

use regex_lite::Regex;

use super::DiscoveredMedia;
use crate::models::{Citation, MediaType};

#[allow(clippy::expect_used)]
static MEDIA_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\w+)\]\s*(.+?)\s*\|\s*(https?://\S+)\s*\|\s*(.+)")
        .expect("valid media line regex")
});

#[allow(clippy::expect_used)]
static YOUTUBE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:v=|youtu\.be/)([a-zA-Z0-9_-]{11})").expect("valid youtube id regex")
});

/// Body of a `## Heading` section up to the next `## ` line, trimmed.
fn section(text: &str, heading: &str) -> Option<String> {
    let mut lines = text.lines();
    lines.by_ref().find(|line| line.trim() == heading)?;
    let body: Vec<&str> = lines.take_while(|line| !line.starts_with("## ")).collect();
    Some(body.join("\n").trim().to_string())
}

/// Summary section, or the whole response when the section is missing.
pub fn parse_summary(content: &str) -> String {
    section(content, "## Summary").unwrap_or_else(|| content.to_string())
}

/// Bullet lines of the key facts section, without their markers.
pub fn parse_key_facts(content: &str) -> Vec<String> {
    let Some(body) = section(content, "## Key Facts") else {
        return Vec::new();
    };
    body.lines()
        .filter(|line| line.trim().starts_with('-'))
        .map(|line| line.trim_start_matches(['-', ' ']).trim().to_string())
        .collect()
}

/// Number the backend's citation URLs as `Source 1`, `Source 2`, ...
pub fn citations_from_urls(urls: &[String]) -> Vec<Citation> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| Citation {
            url: url.clone(),
            title: format!("Source {}", i + 1),
        })
        .collect()
}

pub fn media_type_for_tag(tag: &str) -> MediaType {
    match tag.to_ascii_uppercase().as_str() {
        "YOUTUBE" => MediaType::Youtube,
        "KHAN_ACADEMY" => MediaType::KhanAcademy,
        "INTERACTIVE" => MediaType::Interactive,
        _ => MediaType::Other,
    }
}

/// `https://img.youtube.com/vi/{id}/mqdefault.jpg` for a recognizable video URL.
pub fn youtube_thumbnail(url: &str) -> Option<String> {
    let id = YOUTUBE_ID_RE.captures(url)?.get(1)?.as_str();
    Some(format!("https://img.youtube.com/vi/{id}/mqdefault.jpg"))
}

/// Parse one `[TYPE] Title | URL | Description` line.
pub fn parse_media_line(line: &str) -> Option<DiscoveredMedia> {
    let caps = MEDIA_LINE_RE.captures(line.trim())?;
    let media_type = media_type_for_tag(caps.get(1)?.as_str());
    let url = caps.get(3)?.as_str().trim().to_string();
    let thumbnail_url = if media_type == MediaType::Youtube {
        youtube_thumbnail(&url).unwrap_or_default()
    } else {
        String::new()
    };
    Some(DiscoveredMedia {
        title: caps.get(2)?.as_str().trim().to_string(),
        description: caps.get(4)?.as_str().trim().to_string(),
        url,
        media_type,
        thumbnail_url,
    })
}

pub fn parse_media_list(content: &str) -> Vec<DiscoveredMedia> {
    content.lines().filter_map(parse_media_line).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    const RESEARCH: &str = "Intro line\n\n## Summary\nVolcanoes are openings in the crust.\n\nThey erupt lava.\n\n## Key Facts\n- Lava is molten rock\n- There are about 1,350 active volcanoes\nnot a fact\n  - Indented fact\n\n## Sources\n- ignored";

    #[test]
    fn test_parse_summary_and_facts() {
        assert_eq!(
            parse_summary(RESEARCH),
            "Volcanoes are openings in the crust.\n\nThey erupt lava."
        );
        assert_eq!(
            parse_key_facts(RESEARCH),
            vec![
                "Lava is molten rock".to_string(),
                "There are about 1,350 active volcanoes".to_string(),
                "Indented fact".to_string(),
            ]
        );
    }

    #[test]
    fn test_summary_only_has_no_facts() {
        let content = "## Summary\n  Bees make honey.  \n";
        assert_eq!(parse_summary(content), "Bees make honey.");
        assert_eq!(parse_key_facts(content), Vec::<String>::new());
    }

    #[test]
    fn test_missing_summary_uses_whole_text() {
        let content = "Just some prose about bees.";
        assert_eq!(parse_summary(content), content);
    }

    #[test]
    fn test_citations_are_numbered() {
        let citations =
            citations_from_urls(&["https://a.example".to_string(), "https://b.example".to_string()]);
        assert_eq!(citations[1].title, "Source 2");
        assert_eq!(citations[1].url, "https://b.example");
    }

    #[test]
    fn test_parse_media_lines() {
        let content = "Here are some resources:\n\
            [YOUTUBE] How Volcanoes Work | https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=3 | A fun intro\n\
            [KHAN_ACADEMY] Plate tectonics | https://www.khanacademy.org/science/x | Short lesson\n\
            [PODCAST] Lava talk | https://pod.example/ep1 | Audio\n\
            [INTERACTIVE] No url here | not-a-link | nope\n";
        let media = parse_media_list(content);
        assert_eq!(media.len(), 3);

        assert_eq!(media[0].media_type, MediaType::Youtube);
        assert_eq!(media[0].title, "How Volcanoes Work");
        assert_eq!(
            media[0].url,
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=3"
        );
        assert_eq!(
            media[0].thumbnail_url,
            "https://img.youtube.com/vi/dQw4w9WgXcQ/mqdefault.jpg"
        );

        assert_eq!(media[1].media_type, MediaType::KhanAcademy);
        assert_eq!(media[1].thumbnail_url, "");
        assert_eq!(media[2].media_type, MediaType::Other);
        assert_eq!(media[2].description, "Audio");
    }

    #[test]
    fn test_youtube_thumbnail_needs_full_id() {
        assert_eq!(
            youtube_thumbnail("https://youtu.be/abcdefghijk").as_deref(),
            Some("https://img.youtube.com/vi/abcdefghijk/mqdefault.jpg")
        );
        assert_eq!(youtube_thumbnail("https://youtu.be/short"), None);
    }
}
