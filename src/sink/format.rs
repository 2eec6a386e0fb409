use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;

/// Line format for discovered keys, selected once per run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The object key only
    #[serde(alias = "keys")]
    #[value(alias = "keys")]
    Key,
    /// Direct download URL of the object
    #[default]
    Url,
    /// `key,url`
    Csv,
}

impl OutputFormat {
    /// Render one output line (without newline)
    pub fn render(&self, bucket: &Bucket, key: &str) -> String {
        match self {
            OutputFormat::Key => key.to_string(),
            OutputFormat::Url => bucket.resource_url(key),
            OutputFormat::Csv => format!("{},{}", key, bucket.resource_url(key)),
        }
    }
}
