use thiserror::Error;

/// Failure while turning a URL into a readable body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("bad http status from {url}: {status}")]
    BadStatus { url: String, status: u16 },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing response stream for {url}: requester succeeded without a body")]
    MissingStream { url: String },

    #[error("{details}")]
    Transport { url: String, details: String },

    #[error("no more handlers for request to {url}")]
    NoMoreHandlers { url: String },
}

impl FetchError {
    pub fn transport(url: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            details: details.into(),
        }
    }

    /// HTTP status carried by this error, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to fetch latest release: {0}")]
    ResolveRelease(#[source] FetchError),

    #[error("failed to parse latest release: {0}")]
    ReleaseParse(#[source] serde_json::Error),

    #[error("invalid semantic version: {version:?}")]
    VersionParse { version: String },

    #[error("no binary for the update found: expected asset {expected}")]
    NoBinary { expected: String },

    #[error("fetch failed: {0}")]
    Fetch(#[source] FetchError),

    #[error("decompress failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("update failed: {0}")]
    Replace(#[source] std::io::Error),
}

impl UpdateError {
    pub(crate) fn version_parse(version: impl Into<String>) -> Self {
        Self::VersionParse {
            version: version.into(),
        }
    }

    /// True when the release exists but carries no asset for this platform.
    #[must_use]
    pub fn is_no_binary(&self) -> bool {
        matches!(self, Self::NoBinary { .. })
    }

    /// True for transport-level failures, either while resolving the release
    /// or while downloading the asset.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::ResolveRelease(_) | Self::Fetch(_))
    }
}
