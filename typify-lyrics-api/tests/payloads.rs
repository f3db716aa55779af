use reqwest::StatusCode;
use typify_core::CoreError;
use typify_lyrics_api::parse_response;

const LINE_SYNCED: &str = include_str!("fixtures/line_synced.json");
const UNSYNCED: &str = include_str!("fixtures/unsynced.json");

#[test]
fn test_line_synced_fixture() {
    let store = parse_response(StatusCode::OK, LINE_SYNCED).unwrap();
    assert_eq!(store.len(), 4);
    assert_eq!(store.line(0).unwrap().start_time_ms, 960);
    assert_eq!(store.line(0).unwrap().end_time_ms, None);
    assert_eq!(
        store.normalized(0).unwrap().text(),
        "hello is it me youre looking for"
    );
    assert!(store.normalized(1).unwrap().is_non_lyric_marker());
    assert!(!store.normalized(3).unwrap().is_typeable());
}

#[test]
fn test_unsynced_fixture_is_unavailable() {
    let result = parse_response(StatusCode::OK, UNSYNCED);
    assert!(matches!(result, Err(CoreError::LyricsUnavailable { .. })));
}

#[test]
fn test_malformed_body() {
    let result = parse_response(StatusCode::OK, "{\"lyrics\": 3");
    assert!(matches!(result, Err(CoreError::JsonError(_))));
}
