//! Listing page decoders
//!
//! S3-family and Google listings are XML `ListBucketResult` documents, Azure
//! returns `EnumerationResults`, Firebase returns JSON. Only the fields that
//! drive enumeration are decoded; everything else is ignored.
//!
//! XML listings are read event by event so that element text reaches the
//! caller untouched. Object keys may begin or end with whitespace.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageParseError {
    #[error("invalid XML listing: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("unexpected XML listing: {0}")]
    UnexpectedDocument(String),

    #[error("invalid JSON listing: {0}")]
    Json(#[from] serde_json::Error),

    #[error("listing is truncated but has no key to continue from")]
    TruncatedWithoutKeys,
}

/// One decoded listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Keys in provider order
    pub keys: Vec<String>,
    /// Token for the next page; `None` once the listing is exhausted
    pub next_token: Option<String>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

/// Enumeration fields of an XML listing, keyed by path below the root
#[derive(Debug, Default)]
struct XmlListing {
    keys: Vec<String>,
    is_truncated: bool,
    next_marker: Option<String>,
}

impl XmlListing {
    /// Walk `body`, which must have `root` as its document element, and pick
    /// out the text of leaf elements at `key_path`, `IsTruncated` and
    /// `NextMarker`.
    fn read(body: &[u8], root: &str, key_path: &str) -> Result<Self, PageParseError> {
        let mut reader = Reader::from_reader(body);
        reader.config_mut().trim_text(false);

        let mut listing = XmlListing::default();
        let mut buf = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut leaf = false;
        let mut seen_root = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if path.is_empty() {
                        check_root(&name, root, seen_root)?;
                        seen_root = true;
                    }
                    path.push(name);
                    text.clear();
                    leaf = true;
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if path.is_empty() {
                        check_root(&name, root, seen_root)?;
                        seen_root = true;
                    } else {
                        path.push(name);
                        listing.take(&path[1..].join("/"), key_path, String::new());
                        path.pop();
                    }
                    leaf = false;
                }
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::End(_) => {
                    if leaf && path.len() > 1 {
                        listing.take(&path[1..].join("/"), key_path, std::mem::take(&mut text));
                    }
                    path.pop();
                    leaf = false;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !seen_root {
            return Err(PageParseError::UnexpectedDocument(format!(
                "no <{}> element",
                root
            )));
        }
        if !path.is_empty() {
            return Err(PageParseError::UnexpectedDocument(format!(
                "<{}> is not closed",
                path.join("/")
            )));
        }
        Ok(listing)
    }

    fn take(&mut self, field: &str, key_path: &str, value: String) {
        if field == key_path {
            self.keys.push(value);
        } else if field == "IsTruncated" {
            self.is_truncated = matches!(value.trim(), "true" | "True" | "TRUE" | "1");
        } else if field == "NextMarker" {
            self.next_marker = Some(value);
        }
    }
}

fn check_root(name: &str, root: &str, seen_root: bool) -> Result<(), PageParseError> {
    if seen_root {
        return Err(PageParseError::UnexpectedDocument(
            "more than one document element".to_string(),
        ));
    }
    if name != root {
        return Err(PageParseError::UnexpectedDocument(format!(
            "expected <{}>, found <{}>",
            root, name
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FirebaseListing {
    #[serde(default)]
    items: Vec<FirebaseItem>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirebaseItem {
    #[serde(default)]
    name: String,
}

/// S3 never hands out a token: a truncated page continues after its last key.
pub(super) fn parse_s3(body: &[u8]) -> Result<Page, PageParseError> {
    let listing = XmlListing::read(body, "ListBucketResult", "Contents/Key")?;

    let next_token = if listing.is_truncated {
        Some(last_key(&listing.keys)?)
    } else {
        None
    };

    Ok(Page {
        keys: listing.keys,
        next_token,
    })
}

/// Google prefers an explicit `NextMarker` and falls back to S3 semantics.
pub(super) fn parse_google(body: &[u8]) -> Result<Page, PageParseError> {
    let listing = XmlListing::read(body, "ListBucketResult", "Contents/Key")?;

    let next_token = match non_empty(listing.next_marker) {
        Some(marker) => Some(marker),
        None if listing.is_truncated => Some(last_key(&listing.keys)?),
        None => None,
    };

    Ok(Page {
        keys: listing.keys,
        next_token,
    })
}

pub(super) fn parse_azure(body: &[u8]) -> Result<Page, PageParseError> {
    let listing = XmlListing::read(body, "EnumerationResults", "Blobs/Blob/Name")?;

    Ok(Page {
        keys: listing.keys,
        next_token: non_empty(listing.next_marker),
    })
}
pub(super) fn parse_firebase(body: &[u8]) -> Result<Page, PageParseError> {
    let listing: FirebaseListing = serde_json::from_slice(body)?;
    let keys = listing.items.into_iter().map(|i| i.name).collect();

    Ok(Page {
        keys,
        next_token: non_empty(listing.next_page_token),
    })
}

fn last_key(keys: &[String]) -> Result<String, PageParseError> {
    match keys.last() {
        Some(key) if !key.is_empty() => Ok(key.clone()),
        _ => Err(PageParseError::TruncatedWithoutKeys),
    }
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}
