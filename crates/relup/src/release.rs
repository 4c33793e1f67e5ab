use log::debug;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, UpdateError};
use crate::fetch::{Requester, read_body};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

/// Latest published release as reported by the GitHub releases API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Semantic version carried by the tag.
    ///
    /// # Errors
    /// Returns [`UpdateError::VersionParse`] when the tag is not a version.
    pub fn version(&self) -> Result<Version, UpdateError> {
        parse_version(&self.tag_name)
    }

    /// First asset whose name is exactly `expected`.
    ///
    /// # Errors
    /// Returns [`UpdateError::NoBinary`] when no asset has that name.
    pub fn select_asset(&self, expected: &str) -> Result<&ReleaseAsset, UpdateError> {
        self.assets
            .iter()
            .find(|asset| asset.name == expected)
            .ok_or_else(|| UpdateError::NoBinary {
                expected: expected.to_string(),
            })
    }
}

/// Ask the release host for the latest release of `owner/repo`.
///
/// # Errors
/// Network failures and non-2xx answers (including GitHub's 404 for a
/// repository without releases) surface as [`UpdateError::ResolveRelease`];
/// a malformed document as [`UpdateError::ReleaseParse`].
pub async fn fetch_latest_release(
    requester: &dyn Requester,
    url: &str,
) -> Result<Release, UpdateError> {
    let stream = requester
        .fetch(url)
        .await
        .map_err(UpdateError::ResolveRelease)?
        .ok_or_else(|| {
            UpdateError::ResolveRelease(FetchError::MissingStream {
                url: url.to_string(),
            })
        })?;
    let body = read_body(url, stream)
        .await
        .map_err(UpdateError::ResolveRelease)?;

    let release: Release = serde_json::from_slice(&body).map_err(UpdateError::ReleaseParse)?;
    debug!(
        "Latest release {} has {} asset(s)",
        release.tag_name,
        release.assets.len()
    );
    Ok(release)
}

/// True when `candidate` is strictly newer than `current`. Build metadata
/// does not take part in the comparison.
#[must_use]
pub fn needs_update(current: &Version, candidate: &Version) -> bool {
    current.cmp_precedence(candidate).is_lt()
}

/// Parse a version or release tag, ignoring any non-numeric prefix such as
/// `v` or `release-`. Missing minor/patch components default to zero.
///
/// # Errors
/// Returns [`UpdateError::VersionParse`] when no version can be read.
pub fn parse_version(raw: &str) -> Result<Version, UpdateError> {
    let trimmed = raw.trim();
    let start = trimmed
        .find(|ch: char| ch.is_ascii_digit())
        .ok_or_else(|| UpdateError::version_parse(raw))?;
    parse_semver(&trimmed[start..]).ok_or_else(|| UpdateError::version_parse(raw))
}

fn parse_semver(version: &str) -> Option<Version> {
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().map(str::parse::<u64>).transpose().ok()?;
    let patch = parts.next().map(str::parse::<u64>).transpose().ok()?;

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}
