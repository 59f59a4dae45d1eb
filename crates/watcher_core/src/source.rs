use serde::{Deserialize, Serialize};
use url::Url;

/// How the fetched body of a source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Html,
    Text,
}

/// One configured location to scan. Identity is the url.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: SourceKind,
}

fn default_kind() -> SourceKind {
    SourceKind::Html
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("invalid source url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("unsupported url scheme {scheme} in {url}")]
    UnsupportedScheme { url: String, scheme: String },
}

impl Source {
    pub fn html(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: SourceKind::Html,
        }
    }

    pub fn text(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: SourceKind::Text,
        }
    }

    pub fn is_html(&self) -> bool {
        self.kind == SourceKind::Html
    }

    /// Parse the url and require an http(s) scheme.
    pub fn validate(&self) -> Result<Url, SourceError> {
        let parsed = Url::parse(&self.url).map_err(|err| SourceError::InvalidUrl {
            url: self.url.clone(),
            message: err.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(SourceError::UnsupportedScheme {
                url: self.url.clone(),
                scheme: scheme.to_string(),
            }),
        }
    }
}
