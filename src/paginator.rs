//! Pagination engine
//!
//! Drives one bucket listing from its starting token to a terminal state,
//! fetching exactly one page per step.

use thiserror::Error;
use tracing::debug;

use crate::bucket::{Bucket, Page, PageParseError};
use crate::worker::{FetchError, PageFetcher};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] PageParseError),
}

/// Where a sweep stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// Nothing fetched yet; holds the starting token (empty unless resumed)
    FirstFetch(String),
    /// At least one page fetched; holds the token of the next page
    Continuing(String),
    Exhausted,
    /// Holds the token of the page that could not be fetched or decoded
    Failed(String),
}

impl PageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PageState::Exhausted | PageState::Failed(_))
    }

    /// Token of the next page to request, if any
    pub fn token(&self) -> Option<&str> {
        match self {
            PageState::FirstFetch(token) | PageState::Continuing(token) => Some(token),
            PageState::Exhausted | PageState::Failed(_) => None,
        }
    }
}

/// Fetch and decode a single listing page
pub async fn paginate(
    fetcher: &dyn PageFetcher,
    bucket: &Bucket,
    token: &str,
) -> Result<Page, SweepError> {
    let url = bucket.listing_url(token);
    debug!(bucket = %bucket.name(), %url, "Requesting listing page");

    let body = fetcher.fetch(&url).await?;
    let page = bucket.parse_page(&body)?;
    Ok(page)
}

/// Sequential page walker over one bucket
pub struct Paginator<'a> {
    bucket: &'a Bucket,
    fetcher: &'a dyn PageFetcher,
    state: PageState,
    pages: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(bucket: &'a Bucket, fetcher: &'a dyn PageFetcher, start_token: &str) -> Self {
        Self {
            bucket,
            fetcher,
            state: PageState::FirstFetch(start_token.to_string()),
            pages: 0,
        }
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Fetch the next page and return its keys.
    ///
    /// Returns `Ok(None)` once the paginator is terminal.
    pub async fn step(&mut self) -> Result<Option<Vec<String>>, SweepError> {
        let token = match self.state.token() {
            Some(token) => token.to_string(),
            None => return Ok(None),
        };

        match paginate(self.fetcher, self.bucket, &token).await {
            Ok(page) => {
                self.pages += 1;
                self.state = match page.next_token {
                    Some(next) => PageState::Continuing(next),
                    None => PageState::Exhausted,
                };
                Ok(Some(page.keys))
            }
            Err(e) => {
                self.state = PageState::Failed(token);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies keyed by URL and records every request
    struct ScriptedFetcher {
        pages: HashMap<String, Result<String, u16>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<(String, Result<String, u16>)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(Bytes::from(body.clone())),
                Some(Err(status)) => Err(FetchError::Status {
                    status: *status,
                    reason: "scripted".to_string(),
                }),
                None => Err(FetchError::Status {
                    status: 404,
                    reason: "not found".to_string(),
                }),
            }
        }
    }

    fn firebase() -> Bucket {
        Bucket::Firebase {
            name: "demo.appspot.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_three_page_firebase_sweep() {
        let bucket = firebase();
        let fetcher = ScriptedFetcher::new(vec![
            (
                bucket.listing_url(""),
                Ok(r#"{"items":[{"name":"a"}],"nextPageToken":"A"}"#.to_string()),
            ),
            (
                bucket.listing_url("A"),
                Ok(r#"{"items":[{"name":"b"}],"nextPageToken":"B"}"#.to_string()),
            ),
            (
                bucket.listing_url("B"),
                Ok(r#"{"items":[{"name":"c"}],"nextPageToken":""}"#.to_string()),
            ),
        ]);

        let mut paginator = Paginator::new(&bucket, &fetcher, "");
        let mut keys = Vec::new();
        while let Some(page) = paginator.step().await.unwrap() {
            keys.extend(page);
        }

        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(paginator.state(), &PageState::Exhausted);
        assert_eq!(paginator.pages_fetched(), 3);
        assert_eq!(
            fetcher.requests(),
            vec![
                bucket.listing_url(""),
                bucket.listing_url("A"),
                bucket.listing_url("B"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_token_of_failed_page() {
        let bucket = Bucket::Google {
            name: "g".to_string(),
        };
        let fetcher = ScriptedFetcher::new(vec![
            (
                bucket.listing_url(""),
                Ok("<ListBucketResult><IsTruncated>true</IsTruncated>\
                    <Contents><Key>k1</Key></Contents></ListBucketResult>"
                    .to_string()),
            ),
            (bucket.listing_url("k1"), Err(503)),
        ]);

        let mut paginator = Paginator::new(&bucket, &fetcher, "");
        assert_eq!(paginator.step().await.unwrap(), Some(vec!["k1".to_string()]));
        assert_eq!(paginator.state(), &PageState::Continuing("k1".to_string()));

        let err = paginator.step().await.unwrap_err();
        assert!(matches!(
            err,
            SweepError::Fetch(FetchError::Status { status: 503, .. })
        ));
        assert_eq!(paginator.state(), &PageState::Failed("k1".to_string()));

        // Terminal: no further requests
        assert_eq!(paginator.step().await.unwrap(), None);
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_is_terminal() {
        let bucket = firebase();
        let fetcher = ScriptedFetcher::new(vec![(
            bucket.listing_url("resume-here"),
            Ok("not json".to_string()),
        )]);

        let mut paginator = Paginator::new(&bucket, &fetcher, "resume-here");
        assert!(matches!(
            paginator.step().await,
            Err(SweepError::Parse(PageParseError::Json(_)))
        ));
        assert_eq!(
            paginator.state(),
            &PageState::Failed("resume-here".to_string())
        );
    }

    #[tokio::test]
    async fn test_paginate_single_page() {
        let bucket = Bucket::Azure {
            account: "acct".to_string(),
            container: "c".to_string(),
        };
        let fetcher = ScriptedFetcher::new(vec![(
            bucket.listing_url(""),
            Ok("<EnumerationResults><Blobs><Blob><Name>x</Name></Blob></Blobs>\
                <NextMarker>m2</NextMarker></EnumerationResults>"
                .to_string()),
        )]);

        let page = paginate(&fetcher, &bucket, "").await.unwrap();
        assert_eq!(page.keys, vec!["x"]);
        assert_eq!(page.next_token.as_deref(), Some("m2"));
        assert!(fetcher.requests()[0].contains("restype=container&comp=list"));
    }
}
