//! URL fingerprinting
//!
//! Patterns are tried from most to least specific and the first match wins.
//! Anything unrecognized is treated as a generic S3-compatible endpoint.

use thiserror::Error;
use url::Url;

use super::Bucket;

const FIREBASE_HOST: &str = "firebasestorage.googleapis.com";
const GOOGLE_API_HOST: &str = "storage.googleapis.com";
const GOOGLE_SUBDOMAIN_SUFFIX: &str = ".storage.googleapis.com";
const AZURE_SUFFIX: &str = ".blob.core.windows.net";
const AMAZON_SUFFIX: &str = ".amazonaws.com";
const SPACES_SUFFIX: &str = ".digitaloceanspaces.com";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("URL has no host (missing scheme?): {0}")]
    MissingHost(String),

    /// Not returned by [`resolve`]: the generic fallback accepts every URL
    /// that has a host.
    #[error("unrecognized bucket URL: {0}")]
    Unrecognized(String),
}

/// Split on `separator`, trim, and drop empty pieces
fn segments(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn decode_segment(segment: String) -> String {
    match urlencoding::decode(&segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment,
    }
}

/// A decoded path segment names a bucket only if it is still one segment.
/// `a%2Fb` decodes to `a/b`, which no provider accepts as a bucket name.
fn bucket_segment(segment: &str) -> Option<String> {
    (!segment.contains('/')).then(|| segment.to_string())
}

/// Fingerprint a bucket URL
pub fn resolve(input: &str) -> Result<Bucket, ResolveError> {
    let input = input.trim();
    let parsed = Url::parse(input)?;

    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
        _ => return Err(ResolveError::MissingHost(input.to_string())),
    };

    let path: Vec<String> = segments(parsed.path(), '/')
        .into_iter()
        .map(decode_segment)
        .collect();
    let labels = segments(&host, '.');
    let host = labels.join(".");

    let bucket = firebase(&host, &path)
        .or_else(|| azure(&host, &labels, &path))
        .or_else(|| google(&host, &path))
        .or_else(|| amazon(&host, &path))
        .or_else(|| digital_ocean(&host, &path))
        .unwrap_or_else(|| generic(input, &parsed, &host, &path));

    tracing::debug!(input, provider = bucket.provider(), name = %bucket.name(), "Resolved bucket");
    Ok(bucket)
}

/// `firebasestorage.googleapis.com/v<digit>/b/<name>`
fn firebase(host: &str, path: &[String]) -> Option<Bucket> {
    if host != FIREBASE_HOST || path.len() < 3 {
        return None;
    }

    let version = path[0].strip_prefix('v')?;
    if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) || path[1] != "b" {
        return None;
    }

    Some(Bucket::Firebase {
        name: bucket_segment(&path[2])?,
    })
}

/// `<account>.blob.core.windows.net/<container>`
fn azure(host: &str, labels: &[String], path: &[String]) -> Option<Bucket> {
    if !host.ends_with(AZURE_SUFFIX) || labels.len() < 5 || path.is_empty() {
        return None;
    }

    Some(Bucket::Azure {
        account: labels[labels.len() - 5].clone(),
        container: bucket_segment(&path[0])?,
    })
}

/// `<name>.storage.googleapis.com`, `storage.googleapis.com/<name>`, or the
/// JSON API form `storage.googleapis.com/storage/v1/b/<name>`
fn google(host: &str, path: &[String]) -> Option<Bucket> {
    if let Some(name) = host.strip_suffix(GOOGLE_SUBDOMAIN_SUFFIX) {
        return Some(Bucket::Google {
            name: name.to_string(),
        });
    }

    if host != GOOGLE_API_HOST || path.is_empty() {
        return None;
    }

    let name = match path {
        [api, version, b, name, ..] if api == "storage" && version.starts_with('v') && b == "b" => {
            name
        }
        [name, ..] => name,
        [] => return None,
    };

    Some(Bucket::Google {
        name: bucket_segment(name)?,
    })
}

/// Virtual-hosted and path-style S3 endpoints, with or without a region
fn amazon(host: &str, path: &[String]) -> Option<Bucket> {
    let rest = host.strip_suffix(AMAZON_SUFFIX)?;
    let labels: Vec<&str> = rest.split('.').collect();

    let idx = labels
        .iter()
        .rposition(|l| *l == "s3" || (l.starts_with("s3-") && !l.starts_with("s3-website")))?;

    let region = match (labels[idx], &labels[idx + 1..]) {
        ("s3", []) => None,
        ("s3", [region]) => Some(region.to_string()),
        (dashed, []) => Some(dashed["s3-".len()..].to_string()),
        _ => return None,
    };

    let name = if idx > 0 {
        labels[..idx].join(".")
    } else {
        bucket_segment(path.first()?)?
    };

    Some(Bucket::Amazon { name, region })
}

/// `<name>.<region>.digitaloceanspaces.com` or `<region>.digitaloceanspaces.com/<name>`
fn digital_ocean(host: &str, path: &[String]) -> Option<Bucket> {
    let rest = host.strip_suffix(SPACES_SUFFIX)?;
    let mut labels: Vec<&str> = rest.split('.').collect();
    if labels.last() == Some(&"cdn") {
        labels.pop();
    }

    let (region, prefix) = labels.split_last()?;
    let name = if prefix.is_empty() {
        bucket_segment(path.first()?)?
    } else {
        prefix.join(".")
    };

    Some(Bucket::DigitalOcean {
        name,
        region: region.to_string(),
    })
}

/// Anything else: keep the URL, minus its query, as the listing root
fn generic(input: &str, parsed: &Url, host: &str, path: &[String]) -> Bucket {
    let base_url = match input.find(['?', '#']) {
        Some(pos) => input[..pos].to_string(),
        None => input.to_string(),
    };

    let mut name = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    if !path.is_empty() {
        name = format!("{name}-{}", path.join("-"));
    }

    Bucket::Generic { name, base_url }
}
