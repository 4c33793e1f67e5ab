//! Self-update for standalone executables published as GitHub releases.
//!
//! An [`Updater`] asks the release host for the latest release, compares its
//! tag with the running version, picks the asset named
//! `<prefix><os>-<arch>.gz` (`.exe.gz` on Windows), gunzips it and swaps the
//! running executable:
//! - [`fetch`]: pluggable GET transport (HTTP or scripted).
//! - [`decompress`]: gzip drain with strict corruption checks.
//! - [`release`]: release metadata, version parsing and comparison.
//! - [`replace`]: the executable swap primitive.
//! - [`updater`]: the update cycle and the background poller.

pub mod config;
pub mod decompress;
pub mod error;
pub mod fetch;
pub mod platform;
pub mod release;
pub mod replace;
pub mod updater;

/// Updater settings and their JSON loader.
pub use config::{ConfigError, UpdaterConfig};
/// Error types surfaced by every stage.
pub use error::{FetchError, UpdateError};
/// Transport seam and its two implementations.
pub use fetch::{ByteStream, HttpRequester, Requester, ScriptedRequester};
/// Platform identifier and derived asset name.
pub use platform::{expected_asset_name, platform};
/// Release model and version helpers.
pub use release::{Release, ReleaseAsset, needs_update, parse_version};
/// Executable replacement seam.
pub use replace::{BinaryReplacer, SelfReplacer};
/// Update orchestration.
pub use updater::{BackgroundHandle, UpdateOutcome, Updater};
