use std::time::Duration;

use chrono::FixedOffset;
use history_sdk::{HistoryError, PageResponse};
use reqwest::StatusCode;

use super::*;
use crate::model::fixtures::{message, status};
use crate::model::EntryKind;
use crate::normalize::ViewerZone;

const HEIGHTS: FixedHeights = FixedHeights {
    entry: 20,
    marker: 40,
};

fn shell(items: Vec<LogItem>, previous: Option<&str>, next: Option<&str>) -> ShellPage {
    ShellPage {
        source: Some("/rust/stream/".into()),
        previous: previous.map(str::to_string),
        next: next.map(str::to_string),
        server_timezone: Some("UTC".into()),
        items,
        ..Default::default()
    }
}

fn viewer(shell: ShellPage) -> LogViewer {
    let mut setup = ViewerSetup::new(
        "/rust/",
        Normalizer::new(ViewerZone::Fixed(FixedOffset::east_opt(0).unwrap())),
    );
    setup.client_zone = Some("UTC".into());
    setup.viewport = 600;
    setup.retry = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    };
    LogViewer::new(shell, setup, Preferences::in_memory(), HEIGHTS)
}

/// `count` chat lines from `nick`, one minute apart, starting at 01:00 UTC.
fn lines(nick: &str, count: usize) -> Vec<LogItem> {
    (0..count)
        .map(|i| message(nick, &format!("2021-03-01T01:{:02}:00+00:00", i % 60)))
        .collect()
}

fn li(nick: &str, kind: &str, ts: &str) -> String {
    format!(
        r#"<li data-nick="{nick}" data-type="{kind}"><time datetime="{ts}"></time><span class="message">hi</span></li>"#
    )
}

fn fetches(effects: &[Effect]) -> Vec<&PageRequest> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Fetch(request) => Some(request),
            _ => None,
        })
        .collect()
}

fn opened(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::OpenStream { .. }))
        .count()
}

fn reply(request: &PageRequest, body: String, prev: Option<&str>, next: Option<&str>) -> PageEvent {
    PageEvent {
        direction: request.direction,
        generation: request.generation,
        result: Ok(PageResponse {
            body,
            prev_page: prev.map(str::to_string),
            next_page: next.map(str::to_string),
            timezone: Some("UTC".into()),
        }),
    }
}

fn markers(items: &[LogItem]) -> Vec<u32> {
    items
        .iter()
        .filter_map(|item| match item {
            LogItem::Marker(marker) => Some(marker.flat),
            LogItem::Entry(_) => None,
        })
        .collect()
}

#[test]
fn start_warms_both_caches_and_loads_older_at_top() {
    let mut viewer = viewer(shell(lines("bob", 40), Some("/rust/?page=2"), Some("/rust/?page=4")));
    let effects = viewer.start();

    let requests = fetches(&effects);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].direction, Direction::Older);
    assert_eq!(requests[1].direction, Direction::Newer);
    assert!(viewer.is_loading(Direction::Older));
    assert!(!viewer.is_loading(Direction::Newer));
    assert_eq!(viewer.scroll().content, 800);
}

/// Five chat lines from `nick` on 2021-03-01, starting at 00:`first_minute`.
fn page_body(nick: &str, first_minute: u32) -> String {
    (first_minute..first_minute + 5)
        .map(|minute| li(nick, "message", &format!("2021-03-01T00:{minute:02}:00+00:00")))
        .collect()
}

fn pages_loaded(signals: Vec<ViewerSignal>) -> usize {
    signals
        .iter()
        .filter(|signal| matches!(signal, ViewerSignal::PageLoaded { .. }))
        .count()
}

#[test]
fn one_older_load_per_crossing() {
    let mut viewer = viewer(shell(lines("bob", 100), Some("/rust/?page=3"), None));
    let first = viewer.start();
    assert_eq!(fetches(&first).len(), 1);
    let first = fetches(&first)[0].clone();

    for offset in [10, 5, 0, 30] {
        assert!(viewer.on_scroll(offset).is_empty(), "offset {offset}");
    }
    let effects = viewer.on_page(reply(&first, page_body("ann", 20), Some("/rust/?page=2"), None));
    assert!(!viewer.is_loading(Direction::Older));
    assert_eq!(viewer.scroll().offset, 130);
    let warm = fetches(&effects)[0].clone();
    assert_eq!(warm.url, "/rust/?page=2");

    // the warm page lands while the reader is in the middle
    assert!(viewer.on_scroll(700).is_empty());
    assert!(viewer
        .on_page(reply(&warm, page_body("cat", 10), Some("/rust/?page=1"), None))
        .is_empty());
    viewer.drain_signals();

    let effects = viewer.on_scroll(20);
    let next = fetches(&effects);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].url, "/rust/?page=1");
    assert_eq!(pages_loaded(viewer.drain_signals()), 1);
    assert_eq!(viewer.scroll().offset, 120);
    assert_eq!(viewer.items().len(), 110);

    for offset in [110, 80, 60] {
        assert!(viewer.on_scroll(offset).is_empty(), "offset {offset}");
    }
    assert_eq!(pages_loaded(viewer.drain_signals()), 0);
}

fn tokyo_viewer(shell: ShellPage) -> LogViewer {
    let tokyo = ViewerZone::Fixed(FixedOffset::east_opt(9 * 3600).unwrap());
    let mut setup = ViewerSetup::new("/rust/", Normalizer::new(tokyo));
    setup.client_zone = tokyo.name();
    setup.viewport = 600;
    LogViewer::new(shell, setup, Preferences::in_memory(), HEIGHTS)
}

/// Two lines rendered in New York on March 1st; the second is past midnight in Tokyo.
fn eastern_shell(server_timezone: Option<&str>) -> ShellPage {
    ShellPage {
        source: Some("/rust/stream/".into()),
        server_timezone: server_timezone.map(str::to_string),
        items: vec![
            LogItem::Marker(DateMarker::for_date(
                NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(),
            )),
            message("ann", "2021-03-01T09:30:00-05:00"),
            message("bob", "2021-03-01T10:30:00-05:00"),
        ],
        ..Default::default()
    }
}

#[test]
fn shell_without_a_zone_is_renormalized_on_start() {
    let mut viewer = tokyo_viewer(eastern_shell(None));
    viewer.start();

    assert_eq!(markers(viewer.items()), vec![20210302]);
    let ann = viewer.items()[0].as_entry().expect("entry");
    assert_eq!(ann.time_label, "11:30 pm");
    assert_eq!(ann.flat_date(), 20210301);
    let bob = viewer.items()[2].as_entry().expect("entry");
    assert_eq!(bob.time_label, "12:30 am");
    assert_eq!(bob.flat_date(), 20210302);
}

#[test]
fn following_live_compares_against_converted_dates() {
    let mut viewer = tokyo_viewer(eastern_shell(Some("America/New_York")));
    let effects = viewer.follow_live();
    assert_eq!(opened(&effects), 1);
    assert!(fetches(&effects).is_empty());
    assert_eq!(viewer.top_date(), NaiveDate::from_ymd_opt(2021, 3, 1));

    viewer.on_stream_log(&li("cat", "message", "2021-03-01T10:45:00-05:00"));
    let appended = viewer
        .drain_signals()
        .into_iter()
        .find_map(|signal| match signal {
            ViewerSignal::Appended(items) => Some(items),
            _ => None,
        })
        .expect("appended signal");
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].as_entry().expect("entry").time_label, "12:45 am");
}

#[test]
fn prepending_keeps_visible_content_in_place() {
    let mut viewer = viewer(shell(lines("bob", 40), Some("/rust/?page=2"), None));
    let start = viewer.start();
    let request = fetches(&start)[0].clone();
    viewer.on_scroll(10);

    let body: String = (0..5)
        .map(|i| li("ann", "message", &format!("2021-03-01T00:{i:02}:00+00:00")))
        .collect();
    let effects = viewer.on_page(reply(&request, body, Some("/rust/?page=1"), None));

    assert!(effects.contains(&Effect::ScrollTo {
        offset: 110,
        transition: Duration::ZERO
    }));
    let next = fetches(&effects);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].url, "/rust/?page=1");
    assert_eq!(viewer.items().len(), 45);
    assert_eq!(viewer.items()[0].as_entry().expect("entry").nick, "ann");
    assert!(!viewer.is_loading(Direction::Older));
    assert_eq!(
        viewer.drain_signals().last(),
        Some(&ViewerSignal::PageLoaded {
            direction: Direction::Older,
            count: 5
        })
    );
}

#[test]
fn repeated_chat_author_is_hidden_across_pages() {
    let mut viewer = viewer(shell(lines("bob", 40), Some("/rust/?page=2"), None));
    let request = fetches(&viewer.start())[0].clone();
    let body = li("bob", "message", "2021-03-01T00:59:00+00:00");
    viewer.on_page(reply(&request, body, Some("/rust/?page=1"), None));

    let seam = viewer.items()[1].as_entry().expect("entry");
    assert_eq!(seam.nick, "bob");
    assert!(seam.actor_hidden);
}

#[test]
fn author_stays_visible_when_kinds_differ() {
    let mut viewer = viewer(shell(lines("bob", 40), Some("/rust/?page=2"), None));
    let request = fetches(&viewer.start())[0].clone();
    let body = li("bob", "join", "2021-03-01T00:59:00+00:00");
    viewer.on_page(reply(&request, body, Some("/rust/?page=1"), None));

    assert!(!viewer.items()[1].as_entry().expect("entry").actor_hidden);
}

#[test]
fn check_page_split_compares_author_and_kind() {
    let first = message("ann", "2021-03-01T10:00:00+00:00");
    let first = first.as_entry().expect("entry");

    let mut same = message("ann", "2021-03-01T10:01:00+00:00");
    assert_eq!(check_page_split(first, same.as_entry_mut().expect("entry")), None);
    assert!(same.as_entry().expect("entry").actor_hidden);

    let mut other = message("bob", "2021-03-01T10:01:00+00:00");
    check_page_split(first, other.as_entry_mut().expect("entry"));
    assert!(!other.as_entry().expect("entry").actor_hidden);

    let mut quit = status("ann", EntryKind::Quit, "2021-03-02T10:01:00+00:00");
    let marker = check_page_split(first, quit.as_entry_mut().expect("entry"));
    assert_eq!(marker.map(|m| m.flat), Some(20210302));
    assert!(!quit.as_entry().expect("entry").actor_hidden);
}

#[test]
fn page_seam_across_midnight_gets_one_marker() {
    let mut viewer = viewer(shell(lines("bob", 40), Some("/rust/?page=2"), None));
    let request = fetches(&viewer.start())[0].clone();
    let body = li("ann", "message", "2021-02-28T23:59:00+00:00");
    viewer.on_page(reply(&request, body, Some("/rust/?page=1"), None));

    assert_eq!(markers(viewer.items()), vec![20210301]);
    assert!(viewer.items()[1].is_marker());
}

#[test]
fn newer_exhaustion_opens_stream_exactly_once() {
    let mut viewer = viewer(shell(lines("bob", 40), None, Some("/rust/?page=4")));
    let start = viewer.start();
    let request = fetches(&start)[0].clone();
    assert_eq!(request.direction, Direction::Newer);

    let max = viewer.scroll().max_offset();
    assert!(viewer.on_scroll(max).is_empty());
    assert!(viewer.is_loading(Direction::Newer));

    let effects = viewer.on_page(reply(&request, String::new(), None, None));
    assert_eq!(opened(&effects), 1);
    assert!(viewer.stream_open());
    assert!(!viewer.is_loading(Direction::Newer));

    viewer.on_scroll(0);
    let again = viewer.on_scroll(max);
    assert_eq!(opened(&again), 0);
    assert!(viewer
        .drain_signals()
        .iter()
        .any(|signal| *signal == ViewerSignal::AtBottom));
}

#[test]
fn final_page_is_inserted_before_the_stream_opens() {
    let mut viewer = viewer(shell(lines("bob", 40), None, Some("/rust/?page=4")));
    let request = fetches(&viewer.start())[0].clone();
    viewer.on_scroll(viewer.scroll().max_offset());

    let body = li("ann", "message", "2021-03-01T02:00:00+00:00");
    let effects = viewer.on_page(reply(&request, body, None, None));
    assert!(fetches(&effects).is_empty());
    assert_eq!(viewer.items().len(), 41);
    assert_eq!(
        viewer.items()[40].as_entry().expect("entry").nick,
        "ann"
    );
    assert!(viewer.cache(Direction::Newer).is_exhausted());
    assert_eq!(opened(&effects), 1);
}

#[test]
fn current_page_streams_and_follows_the_bottom() {
    let mut shell = shell(lines("bob", 40), None, None);
    shell.current = true;
    let mut viewer = viewer(shell);
    let start = viewer.start();
    assert_eq!(opened(&start), 1);
    assert_eq!(viewer.scroll().offset, 200);

    let effects = viewer.on_stream_log(&li("ann", "message", "2021-03-01T02:00:00+00:00"));
    assert_eq!(
        effects,
        vec![Effect::ScrollTo {
            offset: 220,
            transition: STREAM_SCROLL_TRANSITION
        }]
    );
    assert_eq!(viewer.scroll().offset, 220);
}

#[test]
fn stream_leaves_a_reader_scrolled_up_alone() {
    let mut shell = shell(lines("bob", 40), None, None);
    shell.current = true;
    let mut viewer = viewer(shell);
    viewer.start();
    viewer.on_scroll(100);

    let effects = viewer.on_stream_log(&li("ann", "message", "2021-03-01T02:00:00+00:00"));
    assert!(effects.is_empty());
    assert_eq!(viewer.scroll().offset, 100);
    assert_eq!(viewer.items().len(), 41);
}

#[test]
fn streamed_entries_on_a_new_day_get_a_single_marker() {
    let mut shell = shell(lines("bob", 3), None, None);
    shell.current = true;
    let mut viewer = viewer(shell);
    viewer.start();
    viewer.drain_signals();

    let html = format!(
        "{}{}",
        li("bob", "message", "2021-03-02T00:10:00+00:00"),
        li("bob", "message", "2021-03-02T00:11:00+00:00")
    );
    viewer.on_stream_log(&html);

    assert_eq!(markers(viewer.items()), vec![20210302]);
    assert!(viewer.items()[3].is_marker());
    let appended = viewer
        .drain_signals()
        .into_iter()
        .find_map(|signal| match signal {
            ViewerSignal::Appended(items) => Some(items),
            _ => None,
        })
        .expect("appended signal");
    assert_eq!(appended.len(), 3);
}

#[test]
fn failed_pages_back_off_then_wait_for_the_next_scroll() {
    let mut viewer = viewer(shell(lines("bob", 40), None, Some("/rust/?page=4")));
    let request = fetches(&viewer.start())[0].clone();
    viewer.on_scroll(viewer.scroll().max_offset());

    let failure = |generation| PageEvent {
        direction: Direction::Newer,
        generation,
        result: Err(HistoryError::UnexpectedStatus {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }),
    };

    let effects = viewer.on_page(failure(request.generation));
    assert_eq!(
        effects,
        vec![Effect::Retry {
            direction: Direction::Newer,
            generation: request.generation,
            after: Duration::from_millis(10)
        }]
    );
    assert_eq!(fetches(&viewer.on_retry(Direction::Newer, request.generation)).len(), 1);
    assert!(viewer.on_retry(Direction::Newer, request.generation + 1).is_empty());

    let effects = viewer.on_page(failure(request.generation));
    assert!(effects.is_empty());
    assert!(!viewer.is_loading(Direction::Newer));
    assert!(!viewer.stream_open());

    viewer.on_scroll(0);
    let rearmed = viewer.on_scroll(viewer.scroll().max_offset());
    let requests = fetches(&rearmed);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "/rust/?page=4");
}

#[test]
fn not_found_counts_as_exhausted() {
    let mut viewer = viewer(shell(lines("bob", 40), None, Some("/rust/?page=4")));
    let request = fetches(&viewer.start())[0].clone();
    viewer.on_scroll(viewer.scroll().max_offset());

    let effects = viewer.on_page(PageEvent {
        direction: Direction::Newer,
        generation: request.generation,
        result: Err(HistoryError::NotFound),
    });
    assert_eq!(opened(&effects), 1);
}

#[test]
fn highlight_centers_the_entry() {
    let mut items = lines("bob", 40);
    items[30].as_entry_mut().expect("entry").id = Some("42".into());
    let mut viewer = viewer(shell(items, None, None));
    viewer.start();

    let effects = viewer.highlight("42");
    assert_eq!(
        effects.first(),
        Some(&Effect::ScrollTo {
            offset: 200,
            transition: Duration::ZERO
        })
    );
    let highlighted: Vec<_> = viewer
        .items()
        .iter()
        .filter_map(LogItem::as_entry)
        .filter(|entry| entry.highlighted)
        .collect();
    assert_eq!(highlighted.len(), 1);
    assert!(viewer.highlight("missing").is_empty());
}

#[test]
fn toggling_the_filter_reflows_status_lines() {
    let items = vec![
        message("ann", "2021-03-01T01:00:00+00:00"),
        status("bob", EntryKind::Join, "2021-03-01T01:01:00+00:00"),
        message("ann", "2021-03-01T01:02:00+00:00"),
    ];
    let mut viewer = viewer(shell(items, None, None));
    viewer.start();
    assert!(viewer.only_chat());
    assert_eq!(viewer.scroll().content, 40);

    assert!(!viewer.toggle_filter());
    assert_eq!(viewer.scroll().content, 60);
}

#[test]
fn top_date_follows_the_scroll_offset() {
    let mut items = lines("bob", 10);
    items.push(LogItem::Marker(DateMarker::for_date(
        NaiveDate::from_ymd_opt(2021, 3, 2).unwrap(),
    )));
    items.extend((0..40).map(|i| message("ann", &format!("2021-03-02T05:{i:02}:00+00:00"))));
    let mut viewer = viewer(shell(items, None, None));
    viewer.start();
    assert_eq!(viewer.top_date().map(|d| d.to_string()), Some("2021-03-01".into()));
    assert_eq!(viewer.marker_offset(20210302), Some(200));

    viewer.drain_signals();
    viewer.on_scroll(260);
    assert_eq!(viewer.top_date().map(|d| d.to_string()), Some("2021-03-02".into()));
    assert!(matches!(
        viewer.drain_signals().as_slice(),
        [ViewerSignal::DateChanged(_)]
    ));
}
