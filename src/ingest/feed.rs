// src/ingest/feed.rs
//! RSS 2.0 / Atom parsing on top of the quick-xml event reader.
//!
//! The reader is streaming, so entries that close before a syntax error are
//! kept. A broken document therefore degrades to a partial result plus a
//! warning instead of losing the whole source.

use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::TaskError;
use crate::ingest::normalize_text;
use crate::ingest::types::Item;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub items: Vec<Item>,
    /// Set when the document was malformed but some entries survived.
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Published,
    Updated,
    Summary,
    Content,
    Id,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"pubDate" | b"published" | b"dc:date" => Some(Field::Published),
            b"updated" => Some(Field::Updated),
            b"description" | b"summary" => Some(Field::Summary),
            b"content" | b"content:encoded" => Some(Field::Content),
            b"guid" | b"id" => Some(Field::Id),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Draft {
    title: String,
    link: String,
    published: String,
    updated: String,
    summary: String,
    content: String,
    id: String,
}

impl Draft {
    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Summary => &mut self.summary,
            Field::Content => &mut self.content,
            Field::Id => &mut self.id,
        }
    }

    /// A repeated element of an already filled field is ignored.
    fn is_filled(&mut self, field: Field) -> bool {
        !self.slot(field).trim().is_empty()
    }

    /// Text and CDATA events of one element are joined with a space.
    fn push(&mut self, field: Field, text: &str) {
        let slot = self.slot(field);
        if !slot.is_empty() {
            slot.push(' ');
        }
        slot.push_str(text);
    }

    fn set_href(&mut self, href: String) {
        if self.link.is_empty() {
            self.link = href;
        }
    }

    fn finish(self, source: &str) -> Option<Item> {
        let title = normalize_text(&self.title);
        let raw_body = if self.summary.trim().is_empty() {
            &self.content
        } else {
            &self.summary
        };
        let body = normalize_text(raw_body);
        if title.is_empty() && body.is_empty() {
            return None;
        }
        let link = self.link.trim().to_string();
        let id = self.id.trim();
        let published_at = if self.published.trim().is_empty() {
            self.updated.trim().to_string()
        } else {
            self.published.trim().to_string()
        };
        Some(Item {
            source: source.to_string(),
            published_unix: parse_timestamp(&published_at),
            unique_id: if id.is_empty() { link.clone() } else { id.to_string() },
            title,
            link,
            published_at,
            body,
        })
    }
}

/// Unix seconds from an RFC 2822 (RSS) or RFC 3339 (Atom) timestamp.
pub fn parse_timestamp(ts: &str) -> Option<i64> {
    let ts = ts.trim();
    OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()
        .map(|dt| dt.unix_timestamp())
}

fn is_entry(tag: &[u8]) -> bool {
    matches!(tag, b"item" | b"entry")
}

fn is_feed_root(tag: &[u8]) -> bool {
    matches!(tag, b"rss" | b"feed" | b"rdf:RDF" | b"channel")
}

/// Atom `<link href=".."/>`: only alternate (or unlabelled) links count.
fn alternate_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        match attr.key.as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel_ok = value == "alternate",
            _ => {}
        }
    }
    href.filter(|_| rel_ok)
}

/// Parse a feed document into items tagged with `source`.
///
/// Errors only when nothing usable could be read.
pub fn parse_feed(source: &str, xml: &str) -> Result<ParsedFeed, TaskError> {
    let t0 = std::time::Instant::now();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut warning = None;
    let mut saw_root = false;

    let mut depth = 0usize;
    let mut entry: Option<(Draft, usize)> = None;
    // (field, depth, capture): elements of a filled field are read but dropped.
    let mut field: Option<(Field, usize, bool)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = e.name();
                let tag = name.as_ref();
                saw_root |= is_feed_root(tag);
                if entry.is_none() {
                    if is_entry(tag) {
                        entry = Some((Draft::default(), depth));
                    }
                } else if let (Some((draft, entry_depth)), None) = (entry.as_mut(), field) {
                    // Only direct children; an Atom <source> carries its own title and id.
                    if depth == *entry_depth + 1 {
                        if let Some(f) = Field::from_tag(tag) {
                            field = Some((f, depth, !draft.is_filled(f)));
                        }
                        if tag == b"link" {
                            if let Some(href) = alternate_href(&e) {
                                draft.set_href(href);
                            }
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let (Some((draft, entry_depth)), None) = (entry.as_mut(), field) {
                    if depth == *entry_depth && e.name().as_ref() == b"link" {
                        if let Some(href) = alternate_href(&e) {
                            draft.set_href(href);
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some((draft, _)), Some((f, _, true))) = (entry.as_mut(), field) {
                    let text = t.unescape().map(|c| c.into_owned()).unwrap_or_else(|_| {
                        // HTML entities such as &nbsp; are not XML; decode them leniently.
                        html_escape::decode_html_entities(&String::from_utf8_lossy(&t))
                            .into_owned()
                    });
                    draft.push(f, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some((draft, _)), Some((f, _, true))) = (entry.as_mut(), field) {
                    draft.push(f, &String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(_)) => {
                if matches!(field, Some((_, d, _)) if d == depth) {
                    field = None;
                }
                if matches!(entry, Some((_, d)) if d == depth) {
                    if let Some((draft, _)) = entry.take() {
                        items.extend(draft.finish(source));
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => {
                if entry.is_some() {
                    warning = Some("document ended inside an unterminated entry".to_string());
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let msg = format!("malformed feed near byte {}: {e}", reader.buffer_position());
                if items.is_empty() {
                    counter!("ingest_parse_failures_total").increment(1);
                    return Err(TaskError::BadResponse(msg));
                }
                warning = Some(msg);
                break;
            }
        }
    }

    if !saw_root && items.is_empty() {
        counter!("ingest_parse_failures_total").increment(1);
        return Err(TaskError::BadResponse(
            "document is not an RSS or Atom feed".to_string(),
        ));
    }

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("ingest_items_total").increment(items.len() as u64);
    Ok(ParsedFeed { items, warning })
}
