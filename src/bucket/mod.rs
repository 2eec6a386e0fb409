//! Bucket variants and URL fingerprinting
//!
//! A [`Bucket`] is the immutable identity of one publicly listable storage
//! bucket. It knows how to build its listing URLs, how to address a single
//! object, and how to decode one page of a listing response.
//!
//! ## Providers
//!
//! - Generic S3-compatible endpoints (fallback for anything unrecognized)
//! - Amazon S3 (region-aware)
//! - DigitalOcean Spaces
//! - Google Cloud Storage
//! - Azure Blob Storage
//! - Firebase Storage
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bucketsweep::bucket;
//!
//! let bucket = bucket::resolve("https://firebasestorage.googleapis.com/v0/b/my-app.appspot.com/o")?;
//! let first = bucket.page_url("");
//! assert_eq!(first, bucket.url());
//! ```

mod pages;
mod resolver;

pub use pages::{Page, PageParseError};
pub use resolver::{ResolveError, resolve};

use serde::Serialize;

/// Query parameters Azure needs before it returns a container listing
const AZURE_LIST_QUERY: &str = "restype=container&comp=list";

/// A storage bucket fingerprinted from a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum Bucket {
    /// Any S3-compatible endpoint, addressed by the URL it was found at
    Generic { name: String, base_url: String },
    /// Amazon S3; `region` is absent for the global endpoint
    Amazon { name: String, region: Option<String> },
    DigitalOcean { name: String, region: String },
    Google { name: String },
    Azure { account: String, container: String },
    Firebase { name: String },
}

impl Bucket {
    /// Short provider label used in logs and the `resolve` command
    pub fn provider(&self) -> &'static str {
        match self {
            Bucket::Generic { .. } => "s3-compatible",
            Bucket::Amazon { .. } => "amazon-s3",
            Bucket::DigitalOcean { .. } => "digitalocean-spaces",
            Bucket::Google { .. } => "google-cloud-storage",
            Bucket::Azure { .. } => "azure-blob",
            Bucket::Firebase { .. } => "firebase-storage",
        }
    }

    /// Stable identity, safe to use as an output file name
    pub fn name(&self) -> String {
        let raw = match self {
            Bucket::Generic { name, .. } | Bucket::Google { name } | Bucket::Firebase { name } => {
                name.clone()
            }
            Bucket::Amazon { name, region } => match region {
                Some(region) => format!("{name}-{region}"),
                None => name.clone(),
            },
            Bucket::DigitalOcean { name, region } => format!("{name}-{region}"),
            Bucket::Azure { account, container } => format!("{account}-{container}"),
        };
        sanitize_name(&raw)
    }

    /// Canonical listing URL of the bucket root
    pub fn url(&self) -> String {
        match self {
            Bucket::Generic { base_url, .. } => base_url.clone(),
            Bucket::Amazon { name, region } => {
                let endpoint = match region {
                    Some(region) => format!("s3.{region}.amazonaws.com"),
                    None => "s3.amazonaws.com".to_string(),
                };
                // Dotted names break TLS on virtual-hosted endpoints
                if name.contains('.') {
                    format!("https://{endpoint}/{name}/")
                } else {
                    format!("https://{name}.{endpoint}/")
                }
            }
            Bucket::DigitalOcean { name, region } => {
                format!("https://{name}.{region}.digitaloceanspaces.com/")
            }
            Bucket::Google { name } => format!("https://{name}.storage.googleapis.com/"),
            Bucket::Azure { account, container } => {
                format!("https://{account}.blob.core.windows.net/{container}")
            }
            Bucket::Firebase { name } => {
                format!("https://firebasestorage.googleapis.com/v0/b/{name}/o")
            }
        }
    }

    /// URL of the listing page that starts after `token`.
    ///
    /// An empty token always yields [`Bucket::url`].
    pub fn page_url(&self, token: &str) -> String {
        if token.is_empty() {
            return self.url();
        }

        let token = urlencoding::encode(token);
        match self {
            Bucket::Generic { .. } | Bucket::Amazon { .. } | Bucket::DigitalOcean { .. } => {
                format!("{}?list-type=2&start-after={token}", self.url())
            }
            Bucket::Google { .. } => format!("{}?marker={token}", self.url()),
            Bucket::Azure { .. } => {
                format!("{}?{AZURE_LIST_QUERY}&marker={token}", self.url())
            }
            Bucket::Firebase { .. } => format!("{}?pageToken={token}", self.url()),
        }
    }

    /// URL actually requested for a page.
    ///
    /// Identical to [`Bucket::page_url`] except for Azure's first page, which
    /// still needs the container listing parameters.
    pub fn listing_url(&self, token: &str) -> String {
        match self {
            Bucket::Azure { .. } if token.is_empty() => {
                format!("{}?{AZURE_LIST_QUERY}", self.url())
            }
            _ => self.page_url(token),
        }
    }

    /// Direct download URL for one object key
    pub fn resource_url(&self, key: &str) -> String {
        let encoded = urlencoding::encode(key);
        match self {
            Bucket::Firebase { .. } => format!("{}/{encoded}?alt=media", self.url()),
            _ => {
                let mut base = self.url();
                if !base.ends_with('/') {
                    base.push('/');
                }
                format!("{base}{encoded}")
            }
        }
    }

    /// Decode one listing response body into keys and a continuation token
    pub fn parse_page(&self, body: &[u8]) -> Result<Page, PageParseError> {
        match self {
            Bucket::Generic { .. } | Bucket::Amazon { .. } | Bucket::DigitalOcean { .. } => {
                pages::parse_s3(body)
            }
            Bucket::Google { .. } => pages::parse_google(body),
            Bucket::Azure { .. } => pages::parse_azure(body),
            Bucket::Firebase { .. } => pages::parse_firebase(body),
        }
    }
}

/// Restrict a name to `[A-Za-z0-9._-]` with no leading dot
fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "bucket".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<Bucket> {
        vec![
            Bucket::Generic {
                name: "s3.example.com-data".to_string(),
                base_url: "https://s3.example.com/data".to_string(),
            },
            Bucket::Amazon {
                name: "assets".to_string(),
                region: Some("eu-west-1".to_string()),
            },
            Bucket::DigitalOcean {
                name: "media".to_string(),
                region: "nyc3".to_string(),
            },
            Bucket::Google {
                name: "public-data".to_string(),
            },
            Bucket::Azure {
                account: "myaccount".to_string(),
                container: "files".to_string(),
            },
            Bucket::Firebase {
                name: "my-app.appspot.com".to_string(),
            },
        ]
    }

    /// Percent-decode the last path segment of a resource URL
    fn last_segment_decoded(url: &str) -> String {
        let without_query = url.split('?').next().unwrap();
        let segment = without_query.rsplit('/').next().unwrap();
        urlencoding::decode(segment).unwrap().into_owned()
    }

    #[test]
    fn test_empty_token_page_url_is_root() {
        for bucket in all_variants() {
            assert_eq!(bucket.page_url(""), bucket.url(), "{}", bucket.provider());
        }
    }

    #[test]
    fn test_page_url_query_parameters() {
        let variants = all_variants();
        assert_eq!(
            variants[0].page_url("a/b c"),
            "https://s3.example.com/data?list-type=2&start-after=a%2Fb%20c"
        );
        assert_eq!(
            variants[3].page_url("next"),
            "https://public-data.storage.googleapis.com/?marker=next"
        );
        assert_eq!(
            variants[4].page_url("2!72"),
            "https://myaccount.blob.core.windows.net/files?restype=container&comp=list&marker=2%2172"
        );
        assert_eq!(
            variants[5].page_url("tok=="),
            "https://firebasestorage.googleapis.com/v0/b/my-app.appspot.com/o?pageToken=tok%3D%3D"
        );
    }

    #[test]
    fn test_azure_listing_url_keeps_list_parameters() {
        let azure = &all_variants()[4];
        assert_eq!(
            azure.listing_url(""),
            "https://myaccount.blob.core.windows.net/files?restype=container&comp=list"
        );
        assert_eq!(azure.listing_url("m"), azure.page_url("m"));

        let google = &all_variants()[3];
        assert_eq!(google.listing_url(""), google.url());
    }

    #[test]
    fn test_resource_url_round_trips_keys() {
        let keys = [
            "plain.txt",
            "nested/dir/file.bin",
            "what?is=this&x",
            "100%25 done %",
            "résumé/日本語 ファイル.pdf",
            "trailing/",
        ];

        for bucket in all_variants() {
            for key in keys {
                let url = bucket.resource_url(key);
                assert_eq!(last_segment_decoded(&url), key, "{url}");
            }
        }
    }

    #[test]
    fn test_resource_url_shapes() {
        let variants = all_variants();
        assert_eq!(
            variants[0].resource_url("a b"),
            "https://s3.example.com/data/a%20b"
        );
        assert_eq!(
            variants[4].resource_url("x/y"),
            "https://myaccount.blob.core.windows.net/files/x%2Fy"
        );
        assert_eq!(
            variants[5].resource_url("images/cat.png"),
            "https://firebasestorage.googleapis.com/v0/b/my-app.appspot.com/o/images%2Fcat.png?alt=media"
        );
    }

    #[test]
    fn test_amazon_urls() {
        let global = Bucket::Amazon {
            name: "logs".to_string(),
            region: None,
        };
        assert_eq!(global.url(), "https://logs.s3.amazonaws.com/");
        assert_eq!(global.name(), "logs");

        let dotted = Bucket::Amazon {
            name: "www.example.com".to_string(),
            region: Some("us-west-2".to_string()),
        };
        assert_eq!(dotted.url(), "https://s3.us-west-2.amazonaws.com/www.example.com/");
        assert_eq!(dotted.name(), "www.example.com-us-west-2");
    }

    #[test]
    fn test_names_are_safe_identifiers() {
        let bucket = Bucket::Generic {
            name: "localhost:9000-../etc-passwd".to_string(),
            base_url: "http://localhost:9000/../etc/passwd".to_string(),
        };
        let name = bucket.name();
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
        assert_eq!(name, "localhost-9000-..-etc-passwd");

        assert_eq!(sanitize_name("../up"), "-up");
        assert_eq!(sanitize_name("..."), "bucket");
        assert_eq!(
            Bucket::Azure {
                account: "acct".to_string(),
                container: "box".to_string()
            }
            .name(),
            "acct-box"
        );
    }
}
