use playlist_ingest::ingestor::{EventSender, ParserOptions, StreamingPlaylistParser, parse_stream};
use playlist_ingest::models::ChannelCategory;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Line {
    Extinf(String),
    Url(String),
    Blank,
    Directive,
}

impl Line {
    fn render(&self) -> String {
        match self {
            Line::Extinf(name) => format!("#EXTINF:-1 group-title=\"Mixed\",{name}"),
            Line::Url(path) => format!("http://example.com/live/{path}.ts"),
            Line::Blank => String::new(),
            Line::Directive => "#EXTVLCOPT:http-user-agent=test".to_string(),
        }
    }
}

fn line() -> impl Strategy<Value = Line> {
    prop_oneof![
        3 => "[A-Za-z0-9 ]{0,12}".prop_map(Line::Extinf),
        3 => "[a-z0-9]{1,8}".prop_map(Line::Url),
        1 => Just(Line::Blank),
        1 => Just(Line::Directive),
    ]
}

/// URL lines whose nearest preceding `#EXTINF` has not been used yet
fn expected_count(lines: &[Line]) -> usize {
    let mut pending = false;
    let mut count = 0;
    for line in lines {
        match line {
            Line::Extinf(_) => pending = true,
            Line::Url(_) if pending => {
                pending = false;
                count += 1;
            }
            _ => {}
        }
    }
    count
}

fn render(lines: &[Line], crlf: bool) -> String {
    let sep = if crlf { "\r\n" } else { "\n" };
    let mut out = format!("#EXTM3U{sep}");
    for line in lines {
        out.push_str(&line.render());
        out.push_str(sep);
    }
    out
}

fn parse_chunks(data: &[u8], cuts: &[usize]) -> Vec<playlist_ingest::Channel> {
    let mut parser =
        StreamingPlaylistParser::new(data.len() as u64, ParserOptions::default(), EventSender::disabled());
    let mut start = 0;
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
    cuts.sort_unstable();
    for cut in cuts {
        parser.feed(&data[start..cut.max(start)]);
        start = cut.max(start);
    }
    parser.feed(&data[start..]);
    parser.finish().channels
}

proptest! {
    #[test]
    fn channel_count_matches_extinf_url_pairs(lines in prop::collection::vec(line(), 0..80), crlf in any::<bool>()) {
        let text = render(&lines, crlf);
        let channels = parse_chunks(text.as_bytes(), &[]);
        prop_assert_eq!(channels.len(), expected_count(&lines));
    }

    #[test]
    fn chunk_boundaries_do_not_change_result(
        lines in prop::collection::vec(line(), 0..60),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let text = render(&lines, false);
        let whole = parse_chunks(text.as_bytes(), &[]);
        let split = parse_chunks(text.as_bytes(), &cuts);
        prop_assert_eq!(whole, split);
    }

    #[test]
    fn parsing_is_deterministic(lines in prop::collection::vec(line(), 0..60)) {
        let text = render(&lines, false);
        let first = parse_chunks(text.as_bytes(), &[]);
        let second = parse_chunks(text.as_bytes(), &[]);
        prop_assert_eq!(first, second);
    }
}

#[tokio::test]
async fn test_large_playlist_streams_with_bounded_events() {
    const COUNT: usize = 50_000;
    let mut text = String::from("#EXTM3U\n");
    for i in 0..COUNT {
        let (group, url) = match i % 3 {
            0 => ("News", format!("http://example.com/live/u/p/{i}.m3u8")),
            1 => ("Films", format!("http://example.com/movie/u/p/{i}.mp4")),
            _ => ("Shows", format!("http://example.com/series/u/p/{i}.mkv")),
        };
        text.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"id{i}\" group-title=\"{group}\",Entry {i}\n{url}\n"
        ));
    }

    let (events, mut receiver) = EventSender::channel();
    let parsed = parse_stream(
        text.as_bytes(),
        text.len() as u64,
        ParserOptions::default(),
        events,
    )
    .await
    .unwrap();

    assert_eq!(parsed.channels.len(), COUNT);
    assert_eq!(parsed.bytes, text.len() as u64);
    let movies = parsed
        .channels
        .iter()
        .filter(|c| c.category() == ChannelCategory::Movies)
        .count();
    let series = parsed
        .channels
        .iter()
        .filter(|c| c.category() == ChannelCategory::Series)
        .count();
    assert_eq!(movies, (0..COUNT).filter(|i| i % 3 == 1).count());
    assert_eq!(series, (0..COUNT).filter(|i| i % 3 == 2).count());

    let mut partials = 0;
    let mut finals = 0;
    while let Ok(event) = receiver.try_recv() {
        match event {
            playlist_ingest::IngestionEvent::Partial(_) => partials += 1,
            playlist_ingest::IngestionEvent::Progress(p) if p >= 1.0 => finals += 1,
            _ => {}
        }
    }
    assert_eq!(finals, 1);
    assert!(partials >= COUNT / 500 - 1);
    assert!(partials <= COUNT / 500 + 1);
}
