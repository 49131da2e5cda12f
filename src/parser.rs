//! Payload decoding.
//!
//! [`parse`] turns a fetched body into a [`ParsedDocument`]: an HTML tree
//! (`scraper`), a JSON value (`serde_json`) or a small owned XML tree built
//! with `quick-xml`. The content-type header picks the decoder; without one
//! the payload is sniffed.
//!
//! `scraper::Html` is not `Send`, so a [`ParsedDocument`] must not be held
//! across an `.await`. Adapters parse and extract inside plain functions.

use crate::error::ParseError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use std::fmt;

/// The decoder a payload is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Json,
    Xml,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Html => "HTML",
            ContentKind::Json => "JSON",
            ContentKind::Xml => "XML",
        };
        f.write_str(name)
    }
}

impl ContentKind {
    /// Map a `Content-Type` header value to a decoder, if it names one.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime.contains("json") {
            Some(ContentKind::Json)
        } else if mime.contains("html") {
            Some(ContentKind::Html)
        } else if mime.contains("xml") || mime.contains("atom") || mime.contains("rss") {
            Some(ContentKind::Xml)
        } else {
            None
        }
    }

    /// Guess the decoder from the first bytes of the payload.
    pub fn sniff(payload: &str) -> Self {
        let head = payload.trim_start();
        if head.starts_with('{') || head.starts_with('[') {
            ContentKind::Json
        } else if ["<?xml", "<feed", "<rss"].iter().any(|p| head.starts_with(p)) {
            ContentKind::Xml
        } else {
            ContentKind::Html
        }
    }
}

/// A decoded payload.
pub enum ParsedDocument {
    Html(Html),
    Json(serde_json::Value),
    Xml(XmlElement),
}

impl fmt::Debug for ParsedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedDocument::Html(_) => f.write_str("ParsedDocument::Html(..)"),
            ParsedDocument::Json(v) => f.debug_tuple("ParsedDocument::Json").field(v).finish(),
            ParsedDocument::Xml(e) => f.debug_tuple("ParsedDocument::Xml").field(&e.name).finish(),
        }
    }
}

impl ParsedDocument {
    pub fn kind(&self) -> ContentKind {
        match self {
            ParsedDocument::Html(_) => ContentKind::Html,
            ParsedDocument::Json(_) => ContentKind::Json,
            ParsedDocument::Xml(_) => ContentKind::Xml,
        }
    }

    pub fn into_xml(self) -> Result<XmlElement, ParseError> {
        match self {
            ParsedDocument::Xml(root) => Ok(root),
            other => Err(ParseError::UnexpectedKind {
                expected: ContentKind::Xml,
                found: other.kind(),
            }),
        }
    }
}

/// Decode `payload`, routing on `content_type_hint` when it names a format.
pub fn parse(payload: &str, content_type_hint: Option<&str>) -> Result<ParsedDocument, ParseError> {
    if payload.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let kind = content_type_hint
        .and_then(ContentKind::from_content_type)
        .unwrap_or_else(|| ContentKind::sniff(payload));

    match kind {
        ContentKind::Html => Ok(ParsedDocument::Html(Html::parse_document(payload))),
        ContentKind::Json => Ok(ParsedDocument::Json(serde_json::from_str(payload)?)),
        ContentKind::Xml => Ok(ParsedDocument::Xml(parse_xml(payload)?)),
    }
}

/// Decode a JSON payload into `T`. Fields marked `#[serde(default)]` absorb
/// anything the service left out.
pub fn parse_json<T: DeserializeOwned>(payload: &str) -> Result<T, ParseError> {
    if payload.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(serde_json::from_str(payload)?)
}

/// Compile a CSS selector, reporting failures as [`ParseError::Selector`].
pub fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::Selector(css.to_string()))
}

/// An owned XML element. Names are local names: `arxiv:comment` is stored as
/// `comment`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first child called `name`, if non-empty.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| c.text.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

fn element_from_start(start: &BytesStart<'_>) -> XmlElement {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let attributes = start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            let value = unescape_text(&raw);
            (key, value)
        })
        .collect();

    XmlElement {
        name,
        attributes,
        ..XmlElement::default()
    }
}

fn unescape_text(raw: &str) -> String {
    quick_xml::escape::unescape(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Build an [`XmlElement`] tree from `payload`, returning the root element.
pub fn parse_xml(payload: &str) -> Result<XmlElement, ParseError> {
    let mut reader = Reader::from_str(payload);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(element_from_start(&start)),
            Event::Empty(start) => {
                let element = element_from_start(&start);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ParseError::Xml("unbalanced closing tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&text).into_owned();
                    current.text.push_str(&unescape_text(&raw));
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::GeneralRef(reference) => {
                if let Some(current) = stack.last_mut() {
                    let name = String::from_utf8_lossy(&reference).into_owned();
                    current.text.push_str(&unescape_text(&format!("&{name};")));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::Xml("document ended inside an open element".to_string()));
    }
    root.ok_or_else(|| ParseError::Missing("root element".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_routing() {
        assert_eq!(
            ContentKind::from_content_type("application/json; charset=utf-8"),
            Some(ContentKind::Json)
        );
        assert_eq!(
            ContentKind::from_content_type("application/atom+xml"),
            Some(ContentKind::Xml)
        );
        assert_eq!(
            ContentKind::from_content_type("text/html"),
            Some(ContentKind::Html)
        );
        assert_eq!(ContentKind::from_content_type("application/octet-stream"), None);
    }

    #[test]
    fn test_sniffing_without_hint() {
        assert_eq!(parse(r#"[1, 2]"#, None).unwrap().kind(), ContentKind::Json);
        assert_eq!(
            parse("<?xml version=\"1.0\"?><feed/>", None).unwrap().kind(),
            ContentKind::Xml
        );
        assert_eq!(parse("<p>hi</p>", None).unwrap().kind(), ContentKind::Html);
    }

    #[test]
    fn test_empty_payload_is_parse_error() {
        assert_eq!(parse("   ", Some("application/json")).unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = parse(r#"{"hits": ["#, Some("application/json")).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let err = parse("<feed><entry></feed>", Some("application/atom+xml")).unwrap_err();
        assert!(matches!(err, ParseError::Xml(_)));

        let err = parse("<feed><entry>", Some("application/atom+xml")).unwrap_err();
        assert!(matches!(err, ParseError::Xml(_)));
    }

    #[test]
    fn test_wrong_kind_accessor() {
        let doc = parse(r#"{"a": 1}"#, None).unwrap();
        let err = doc.into_xml().unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedKind {
                expected: ContentKind::Xml,
                found: ContentKind::Json
            }
        );
    }

    #[test]
    fn test_xml_tree_uses_local_names() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
              <entry>
                <title>Ownership &amp; Borrowing</title>
                <arxiv:primary_category term="cs.PL"/>
                <link href="http://arxiv.org/abs/1" rel="alternate"/>
                <summary><![CDATA[Raw <b>text</b>]]></summary>
              </entry>
            </feed>"#;

        let root = parse(xml, None).unwrap().into_xml().unwrap();
        assert_eq!(root.name, "feed");

        let entry = root.child("entry").unwrap();
        assert_eq!(entry.child_text("title").as_deref(), Some("Ownership & Borrowing"));
        assert_eq!(entry.child("primary_category").unwrap().attr("term"), Some("cs.PL"));
        assert_eq!(entry.child("link").unwrap().attr("rel"), Some("alternate"));
        assert_eq!(entry.child_text("summary").as_deref(), Some("Raw <b>text</b>"));
    }

    #[test]
    fn test_parse_json_with_defaults() {
        #[derive(serde::Deserialize)]
        struct Hit {
            title: String,
            #[serde(default)]
            points: i64,
        }

        let hit: Hit = parse_json(r#"{"title": "Rust 2024"}"#).unwrap();
        assert_eq!(hit.title, "Rust 2024");
        assert_eq!(hit.points, 0);
    }

    #[test]
    fn test_invalid_selector() {
        assert!(matches!(selector("a[["), Err(ParseError::Selector(_))));
        assert!(selector("article.Box-row h2 a").is_ok());
    }
}
