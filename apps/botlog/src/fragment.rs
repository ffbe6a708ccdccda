//! Parsing of the server-rendered HTML the log endpoints return.
//!
//! The markup is produced by a trusted server with a fixed shape: entries are
//! `<li data-nick data-type>` elements holding a `<time datetime>` child, date
//! markers are `<h3 data-date>`. Only that contract is understood here.

use std::collections::HashMap;

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::model::{date_from_flat, DateMarker, EntryKind, LogEntry, LogItem};
use crate::timeline::TimelineLink;

static ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<li\b(?P<li>[^>]*\bdata-type\s*=\s*"[^"]*"[^>]*)>(?P<li_body>.*?)</li>|<h3\b(?P<h3>[^>]*)>(?P<h3_body>.*?)</h3>"#,
    )
    .expect("item regex")
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attr regex")
});
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<time\b([^>]*)>(.*?)</time>").expect("time regex"));
static ACTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<(?:span|a|strong)\b[^>]*class\s*=\s*"[^"]*\bactor\b[^"]*"[^>]*>(.*?)</(?:span|a|strong)>"#)
        .expect("actor regex")
});
static MESSAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<(?:span|div|p)\b[^>]*class\s*=\s*"[^"]*\bmessage\b[^"]*"[^>]*>(.*)</(?:span|div|p)>"#)
        .expect("message regex")
});
static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a\b([^>]*)>(.*?)</a>").expect("anchor regex"));
static OPEN_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[a-zA-Z][a-zA-Z0-9]*\b([^>]*)>").expect("open tag regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("entity regex"));

/// Everything the viewer needs from a full channel page.
#[derive(Debug, Clone, Default)]
pub struct ShellPage {
    pub source: Option<String>,
    pub previous: Option<String>,
    pub next: Option<String>,
    pub current: bool,
    pub server_timezone: Option<String>,
    pub search_term: Option<String>,
    pub items: Vec<LogItem>,
    pub links: Vec<TimelineLink>,
}

/// Parses a fragment into entries and markers in document order.
pub fn parse_items(html: &str) -> Vec<LogItem> {
    let mut items = Vec::new();
    for caps in ITEM_RE.captures_iter(html) {
        if let (Some(attrs), Some(body)) = (caps.name("li"), caps.name("li_body")) {
            match parse_entry(attrs.as_str(), body.as_str()) {
                Some(entry) => items.push(LogItem::Entry(entry)),
                None => {
                    warn!(target = "botlog.fragment", "skipping entry without a usable timestamp");
                }
            }
        } else if let (Some(attrs), Some(body)) = (caps.name("h3"), caps.name("h3_body")) {
            let attrs = parse_attrs(attrs.as_str());
            let flat = attrs
                .get("data-date")
                .and_then(|raw| raw.trim().parse::<u32>().ok());
            if let Some(date) = flat.and_then(date_from_flat) {
                let mut marker = DateMarker::for_date(date);
                let label = text_content(body.as_str());
                if !label.is_empty() {
                    marker.label = label;
                }
                items.push(LogItem::Marker(marker));
            }
        }
    }
    items
}

/// Parses a full channel page: the `#Log` element's data attributes, its
/// entries and the timeline navigation links.
pub fn parse_shell(html: &str) -> ShellPage {
    let mut shell = ShellPage::default();
    for caps in OPEN_TAG_RE.captures_iter(html) {
        let attrs = parse_attrs(&caps[1]);
        if attrs.get("id").map(String::as_str) != Some("Log") {
            continue;
        }
        shell.source = non_empty(attrs.get("data-source"));
        shell.previous = non_empty(attrs.get("data-previous"));
        shell.next = non_empty(attrs.get("data-next"));
        shell.current = attrs
            .get("data-current")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));
        shell.server_timezone = non_empty(attrs.get("data-timezone"));
        shell.search_term = non_empty(attrs.get("data-search-term"));
        break;
    }
    shell.items = parse_items(html);
    shell.links = parse_timeline_links(html);
    shell
}

fn parse_timeline_links(html: &str) -> Vec<TimelineLink> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = parse_attrs(&caps[1]);
            let classes = attrs.get("class").map(String::as_str).unwrap_or_default();
            if !has_class(classes, "jump-date") {
                return None;
            }
            let date = attrs.get("data-date")?.trim().parse::<u32>().ok()?;
            Some(TimelineLink {
                date,
                href: attrs.get("href").cloned().unwrap_or_default(),
                label: text_content(&caps[2]),
                current: has_class(classes, "current"),
            })
        })
        .collect()
}

fn parse_entry(raw_attrs: &str, body: &str) -> Option<LogEntry> {
    let attrs = parse_attrs(raw_attrs);
    let time_caps = TIME_RE.captures(body)?;
    let time_attrs = parse_attrs(&time_caps[1]);
    let timestamp = DateTime::parse_from_rfc3339(time_attrs.get("datetime")?.trim()).ok()?;

    let kind = EntryKind::parse(attrs.get("data-type").map(String::as_str).unwrap_or("message"));
    let nick = attrs
        .get("data-nick")
        .cloned()
        .or_else(|| ACTOR_RE.captures(body).map(|c| text_content(&c[1])))
        .unwrap_or_default();
    let actor_hidden = ACTOR_RE
        .find(body)
        .is_some_and(|m| m.as_str().contains("display:none") || m.as_str().contains("display: none"));

    let message_html = MESSAGE_RE
        .captures(body)
        .map(|c| c.get(1).map_or("", |m| m.as_str()).to_string())
        .unwrap_or_else(|| {
            let without_time = TIME_RE.replace_all(body, "");
            ACTOR_RE.replace_all(&without_time, "").into_owned()
        });

    let image_links = ANCHOR_RE
        .captures_iter(&message_html)
        .filter_map(|caps| {
            let attrs = parse_attrs(&caps[1]);
            let classes = attrs.get("class").map(String::as_str).unwrap_or_default();
            has_class(classes, "image")
                .then(|| attrs.get("href").cloned())
                .flatten()
        })
        .collect();

    let mut entry = LogEntry::new(nick, kind, timestamp);
    entry.id = non_empty(attrs.get("id"));
    entry.body = text_content(&message_html);
    entry.image_links = image_links;
    entry.actor_hidden = actor_hidden;
    let served_label = text_content(&time_caps[2]);
    if !served_label.is_empty() {
        entry.time_label = served_label;
    }
    Some(entry)
}

fn parse_attrs(raw: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            (caps[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

fn has_class(classes: &str, wanted: &str) -> bool {
    classes.split_whitespace().any(|class| class == wanted)
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Visible text of an HTML snippet with whitespace collapsed.
pub fn text_content(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, "");
    let decoded = decode_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <h3 id="date-20210301" data-date="20210301"><span>March 1st, 2021</span></h3>
        <li id="101" data-nick="ann" data-type="message">
          <time datetime="2021-03-01T23:50:00+00:00">11:50 pm</time>
          <span class="actor">ann</span>
          <span class="message">see <a class="image" href="https://i.example/cat.png">cat</a> &amp; dog</span>
        </li>
        <li id="102" data-nick="bob" data-type="join">
          <time datetime="2021-03-02T00:10:00+00:00">12:10 am</time>
          <span class="message">bob joined the channel</span>
        </li>
        <li id="103" data-nick="eve" data-type="message"><span class="message">no time</span></li>
    "#;

    #[test]
    fn parses_entries_and_markers_in_order() {
        let items = parse_items(PAGE);
        assert_eq!(items.len(), 3);
        match &items[0] {
            LogItem::Marker(marker) => {
                assert_eq!(marker.flat, 20210301);
                assert_eq!(marker.label, "March 1st, 2021");
            }
            other => panic!("expected marker, got {other:?}"),
        }
        let ann = items[1].as_entry().expect("entry");
        assert_eq!(ann.id.as_deref(), Some("101"));
        assert_eq!(ann.nick, "ann");
        assert_eq!(ann.kind, EntryKind::Message);
        assert_eq!(ann.body, "see cat & dog");
        assert_eq!(ann.image_links, vec!["https://i.example/cat.png".to_string()]);
        assert_eq!(ann.time_label, "11:50 pm");
        assert_eq!(ann.flat_date(), 20210301);

        let bob = items[2].as_entry().expect("entry");
        assert_eq!(bob.kind, EntryKind::Join);
        assert!(bob.kind.is_status());
    }

    #[test]
    fn reads_shell_attributes_and_timeline() {
        let html = r#"
            <nav class="timeline-navigation"><ul>
              <li class="year"><a href="/rust/2021/">2021</a><ul class="month-list">
                <li><a class="jump-date" data-date="20210201" href="/rust/2021-02-01/">Feb</a></li>
                <li><a class="jump-date current" data-date="20210301" href="/rust/">Mar</a></li>
              </ul></li>
            </ul></nav>
            <ul id="Log" data-source="/rust/stream/" data-previous="/rust/?page=1"
                data-next="" data-current="True" data-timezone="" data-search-term="cat">
            </ul>
            <li data-nick="ann" data-type="message"><time datetime="2021-03-01T10:00:00+00:00"></time></li>
        "#;
        let shell = parse_shell(html);
        assert_eq!(shell.source.as_deref(), Some("/rust/stream/"));
        assert_eq!(shell.previous.as_deref(), Some("/rust/?page=1"));
        assert_eq!(shell.next, None);
        assert!(shell.current);
        assert_eq!(shell.server_timezone, None);
        assert_eq!(shell.search_term.as_deref(), Some("cat"));
        assert_eq!(shell.items.len(), 1);
        assert_eq!(shell.links.len(), 2);
        assert_eq!(shell.links[1].date, 20210301);
        assert!(shell.links[1].current);
        assert_eq!(shell.links[0].label, "Feb");
    }

    #[test]
    fn decodes_numeric_and_named_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &#39;c&#x27; &bogus;"), "a <b> 'c' &bogus;");
        assert_eq!(text_content("<b>x</b>\n   <i>y</i>"), "x y");
    }
}
