use anyhow::Result;
use async_trait::async_trait;

/// Raw response of a content backend for one URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFetch {
    pub success: bool,
    pub title: Option<String>,
    pub cleaned_content: Option<String>,
    pub raw_markup: Option<String>,
    pub error_message: Option<String>,
}

impl PageFetch {
    pub fn ok(title: Option<String>, cleaned_content: String, raw_markup: Option<String>) -> Self {
        Self {
            success: true,
            title,
            cleaned_content: Some(cleaned_content),
            raw_markup,
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
            ..Self::default()
        }
    }
}

/// Anything that can turn a URL into page content. A returned `Err` and a
/// `PageFetch` with `success == false` are handled identically by callers.
#[async_trait]
pub trait ContentFetchBackend: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageFetch>;
}
