use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use semver::Version;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::UpdaterConfig;
use crate::decompress::gunzip;
use crate::error::{FetchError, UpdateError};
use crate::fetch::{ByteStream, HttpRequester, Requester, read_body};
use crate::platform::expected_asset_name;
use crate::release::{Release, fetch_latest_release, needs_update, parse_version};
use crate::replace::{BinaryReplacer, SelfReplacer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    NoUpdateAvailable { latest: String },
    Updated { version: String },
}

#[derive(Debug, Default)]
struct UpdaterState {
    latest_release: Option<Release>,
    installed: Option<Version>,
}

/// Keeps one executable in sync with the latest GitHub release of a repo.
pub struct Updater {
    current_version: String,
    owner: String,
    repo: String,
    file_prefix: String,
    requester: Option<Arc<dyn Requester>>,
    default_requester: OnceCell<HttpRequester>,
    replacer: Arc<dyn BinaryReplacer>,
    config: UpdaterConfig,
    state: Mutex<UpdaterState>,
}

impl Updater {
    pub fn new(
        current_version: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        file_prefix: impl Into<String>,
    ) -> Self {
        Self {
            current_version: current_version.into(),
            owner: owner.into(),
            repo: repo.into(),
            file_prefix: file_prefix.into(),
            requester: None,
            default_requester: OnceCell::new(),
            replacer: Arc::new(SelfReplacer::new()),
            config: UpdaterConfig::default(),
            state: Mutex::new(UpdaterState::default()),
        }
    }

    #[must_use]
    pub fn with_requester(mut self, requester: Arc<dyn Requester>) -> Self {
        self.requester = Some(requester);
        self
    }

    #[must_use]
    pub fn with_replacer(mut self, replacer: Arc<dyn BinaryReplacer>) -> Self {
        self.replacer = replacer;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: UpdaterConfig) -> Self {
        self.config = config;
        self.default_requester = OnceCell::new();
        self
    }

    #[must_use]
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    #[must_use]
    pub fn file_prefix(&self) -> &str {
        &self.file_prefix
    }

    #[must_use]
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// The injected requester; `None` means the default HTTP requester is used.
    #[must_use]
    pub fn requester(&self) -> Option<&Arc<dyn Requester>> {
        self.requester.as_ref()
    }

    /// Release metadata from the most recent resolution, if any.
    pub async fn latest_release(&self) -> Option<Release> {
        self.state.lock().await.latest_release.clone()
    }

    /// Resolve the latest release and report it if it is newer than what is
    /// running. Nothing is downloaded.
    ///
    /// # Errors
    /// Returns resolution and version parse errors.
    pub async fn check_update_available(&self) -> Result<Option<Release>, UpdateError> {
        let mut state = self.state.lock().await;
        let release = self.resolve_locked(&mut state).await?;
        let latest = release.version()?;
        let current = self.effective_version(&state)?;
        Ok(needs_update(&current, &latest).then_some(release))
    }

    /// Run one full update cycle: resolve, select, download, decompress and
    /// replace the running executable.
    ///
    /// # Errors
    /// Returns the first failing stage's error. Nothing is retried.
    pub async fn update(&self) -> Result<UpdateOutcome, UpdateError> {
        let mut state = self.state.lock().await;
        let release = self.resolve_locked(&mut state).await?;
        self.apply_locked(&mut state, &release).await
    }

    /// Run the update cycle against release metadata the caller already has.
    ///
    /// # Errors
    /// Same as [`Updater::update`], minus resolution failures.
    pub async fn update_from(&self, release: &Release) -> Result<UpdateOutcome, UpdateError> {
        let mut state = self.state.lock().await;
        state.latest_release = Some(release.clone());
        self.apply_locked(&mut state, release).await
    }

    /// GET `url` through the configured requester.
    ///
    /// # Errors
    /// Returns the requester's error, or [`FetchError::MissingStream`] when it
    /// reports success without a body.
    pub async fn fetch(&self, url: &str) -> Result<ByteStream, FetchError> {
        self.active_requester()
            .await?
            .fetch(url)
            .await?
            .ok_or_else(|| FetchError::MissingStream {
                url: url.to_string(),
            })
    }

    /// Download `url` and gunzip it.
    ///
    /// # Errors
    /// Returns [`UpdateError::Fetch`] when the request or the body read fails,
    /// and [`UpdateError::Decompress`] when the downloaded bytes are not valid
    /// gzip.
    pub async fn fetch_gz(&self, url: &str) -> Result<Vec<u8>, UpdateError> {
        let stream = self.fetch(url).await.map_err(UpdateError::Fetch)?;
        let compressed = read_body(url, stream).await.map_err(UpdateError::Fetch)?;
        gunzip(&compressed).map_err(UpdateError::Decompress)
    }

    /// Run one update cycle now, then keep polling every `interval` on a
    /// background task until the returned handle is cancelled.
    pub async fn start_background(
        self: &Arc<Self>,
        interval: Duration,
    ) -> (Result<UpdateOutcome, UpdateError>, BackgroundHandle) {
        let first = self.update().await;
        report_cycle(0, &first);

        let token = CancellationToken::new();
        let task = tokio::spawn(poll_updates(Arc::clone(self), interval, token.clone()));
        (first, BackgroundHandle { token, task })
    }

    async fn active_requester(&self) -> Result<&dyn Requester, FetchError> {
        if let Some(requester) = &self.requester {
            return Ok(requester.as_ref());
        }
        let http = self
            .default_requester
            .get_or_try_init(|| async { HttpRequester::new(&self.config) })
            .await?;
        Ok(http)
    }

    async fn resolve_locked(&self, state: &mut UpdaterState) -> Result<Release, UpdateError> {
        let url = self.config.latest_release_url(&self.owner, &self.repo);
        let requester = self
            .active_requester()
            .await
            .map_err(UpdateError::ResolveRelease)?;
        let release = fetch_latest_release(requester, &url).await?;
        state.latest_release = Some(release.clone());
        Ok(release)
    }

    fn effective_version(&self, state: &UpdaterState) -> Result<Version, UpdateError> {
        let current = parse_version(&self.current_version)?;
        Ok(match &state.installed {
            Some(installed) if needs_update(&current, installed) => installed.clone(),
            _ => current,
        })
    }

    async fn apply_locked(
        &self,
        state: &mut UpdaterState,
        release: &Release,
    ) -> Result<UpdateOutcome, UpdateError> {
        let latest = release.version()?;
        let current = self.effective_version(state)?;
        if !needs_update(&current, &latest) {
            debug!("Running {current}, latest release is {latest}: nothing to do");
            return Ok(UpdateOutcome::NoUpdateAvailable {
                latest: latest.to_string(),
            });
        }

        let expected = expected_asset_name(&self.file_prefix);
        let asset = release.select_asset(&expected)?;
        info!(
            "Updating {current} -> {latest} from {}",
            asset.browser_download_url
        );

        let binary = self.fetch_gz(&asset.browser_download_url).await?;
        debug!("Downloaded {} ({} bytes unpacked)", asset.name, binary.len());

        let replacer = Arc::clone(&self.replacer);
        tokio::task::spawn_blocking(move || replacer.replace(&binary))
            .await
            .map_err(|join| UpdateError::Replace(std::io::Error::other(join)))?
            .map_err(UpdateError::Replace)?;

        state.installed = Some(latest.clone());
        info!("Installed {latest}; restart to run the new version");
        Ok(UpdateOutcome::Updated {
            version: latest.to_string(),
        })
    }
}

/// Control for the polling task started by [`Updater::start_background`].
#[derive(Debug)]
pub struct BackgroundHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl BackgroundHandle {
    /// Stop polling. A cycle already in flight runs to completion.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait for the polling task to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(error) = self.task.await {
            warn!("Background updater task ended abnormally: {error}");
        }
    }
}

async fn poll_updates(updater: Arc<Updater>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cycle: u64 = 1;
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = updater.update().await;
        report_cycle(cycle, &outcome);
        cycle += 1;
    }

    debug!("Background update polling stopped after {} cycle(s)", cycle - 1);
}

fn report_cycle(cycle: u64, outcome: &Result<UpdateOutcome, UpdateError>) {
    match outcome {
        Ok(UpdateOutcome::Updated { version }) => {
            info!("Update cycle {cycle}: installed {version}");
        }
        Ok(UpdateOutcome::NoUpdateAvailable { latest }) => {
            debug!("Update cycle {cycle}: up to date (latest {latest})");
        }
        Err(error) if error.is_no_binary() => {
            warn!("Update cycle {cycle}: {error}");
        }
        Err(error) => {
            error!("Update cycle {cycle} failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _, ReadBuf};

    use super::{UpdateOutcome, Updater};
    use crate::decompress::gzip;
    use crate::error::{FetchError, UpdateError};
    use crate::fetch::{ByteStream, ScriptedRequester, read_body, stream_from_bytes};
    use crate::platform::expected_asset_name;
    use crate::release::{Release, ReleaseAsset};
    use crate::replace::BinaryReplacer;

    #[derive(Default)]
    struct RecordingReplacer {
        images: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl RecordingReplacer {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn images(&self) -> Vec<Vec<u8>> {
            self.images
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl BinaryReplacer for RecordingReplacer {
        fn replace(&self, binary: &[u8]) -> std::io::Result<()> {
            if self.fail {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "text file busy",
                ));
            }
            self.images
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(binary.to_vec());
            Ok(())
        }
    }

    /// Body that fails as if the connection dropped.
    struct ResetBody;

    impl AsyncRead for ResetBody {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )))
        }
    }

    fn release_json(tag: &str, assets: &[(&str, &str)]) -> String {
        let assets: Vec<_> = assets
            .iter()
            .map(|(name, url)| serde_json::json!({"name": name, "browser_download_url": url}))
            .collect();
        serde_json::json!({"tag_name": tag, "assets": assets}).to_string()
    }

    fn scripted_updater(
        current: &str,
        prefix: &str,
    ) -> (Updater, Arc<ScriptedRequester>, Arc<RecordingReplacer>) {
        let requester = Arc::new(ScriptedRequester::new());
        let replacer = Arc::new(RecordingReplacer::default());
        let updater = Updater::new(current, "ao-data", "go-githubupdate", prefix)
            .with_requester(requester.clone())
            .with_replacer(replacer.clone());
        (updater, requester, replacer)
    }

    #[test]
    fn new_updater_keeps_construction_parameters() {
        let updater = Updater::new("1.0.0", "ao-data", "go-githubupdate", "update-");

        assert_eq!(updater.current_version(), "1.0.0");
        assert_eq!(updater.owner(), "ao-data");
        assert_eq!(updater.repo(), "go-githubupdate");
        assert_eq!(updater.file_prefix(), "update-");
        assert!(updater.requester().is_none());
    }

    #[tokio::test]
    async fn update_from_release_without_platform_asset_is_no_binary() {
        let (updater, requester, replacer) = scripted_updater("1.0.0", "update-");
        let release = Release {
            tag_name: "2.0.0".to_string(),
            assets: vec![ReleaseAsset {
                name: "wrong-file.gz".to_string(),
                browser_download_url: String::new(),
            }],
        };

        let error = updater
            .update_from(&release)
            .await
            .expect_err("no matching binary should fail");

        assert!(matches!(error, UpdateError::NoBinary { .. }));
        assert!(requester.requested_urls().is_empty());
        assert!(replacer.images().is_empty());
    }

    #[tokio::test]
    async fn update_from_downloads_the_matching_asset() {
        let (updater, requester, replacer) = scripted_updater("1.0.0", "myapp-");
        let expected = expected_asset_name("myapp-");
        let download_url = format!("https://example.com/download/{expected}");
        let release = Release {
            tag_name: "2.0.0".to_string(),
            assets: vec![
                ReleaseAsset {
                    name: "wrong-file.gz".to_string(),
                    browser_download_url: "https://example.com/download/wrong-file.gz"
                        .to_string(),
                },
                ReleaseAsset {
                    name: expected,
                    browser_download_url: download_url.clone(),
                },
            ],
        };
        requester.push_bytes(gzip(b"fake binary content"));

        let outcome = updater
            .update_from(&release)
            .await
            .expect("update should succeed");

        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                version: "2.0.0".to_string()
            }
        );
        assert_eq!(requester.requested_urls(), [download_url]);
        assert_eq!(replacer.images(), [b"fake binary content".to_vec()]);
        assert_eq!(updater.latest_release().await, Some(release));
    }

    #[tokio::test]
    async fn replacement_failure_is_reported_as_update_failure() {
        let requester = Arc::new(ScriptedRequester::new());
        let expected = expected_asset_name("myapp-");
        requester.push_bytes(release_json(
            "2.0.0",
            &[(expected.as_str(), "https://example.com/bin")],
        ));
        requester.push_bytes(gzip(b"new image"));
        let updater = Updater::new("1.0.0", "ao-data", "tool", "myapp-")
            .with_requester(requester)
            .with_replacer(Arc::new(RecordingReplacer::failing()));

        let error = updater.update().await.expect_err("replacement should fail");

        assert!(matches!(error, UpdateError::Replace(_)));
        assert!(error.to_string().contains("update failed"));
    }

    #[tokio::test]
    async fn update_installs_once_then_reports_up_to_date() {
        let (updater, requester, replacer) = scripted_updater("1.0.0", "myapp-");
        let expected = expected_asset_name("myapp-");
        let json = release_json("v2.0.0", &[(expected.as_str(), "https://example.com/bin")]);
        requester.push_bytes(json.clone());
        requester.push_bytes(gzip(b"v2 image"));
        requester.push_bytes(json);

        let first = updater.update().await.expect("first cycle should succeed");
        let second = updater.update().await.expect("second cycle should succeed");

        assert!(matches!(first, UpdateOutcome::Updated { .. }));
        assert_eq!(
            second,
            UpdateOutcome::NoUpdateAvailable {
                latest: "2.0.0".to_string()
            }
        );
        assert_eq!(replacer.images().len(), 1);
        assert_eq!(
            requester.requested_urls(),
            [
                "https://api.github.com/repos/ao-data/go-githubupdate/releases/latest",
                "https://example.com/bin",
                "https://api.github.com/repos/ao-data/go-githubupdate/releases/latest",
            ]
        );
    }

    #[tokio::test]
    async fn older_release_is_not_downloaded() {
        let (updater, requester, replacer) = scripted_updater("2.0.0", "myapp-");
        let expected = expected_asset_name("myapp-");
        requester.push_bytes(release_json(
            "1.0.0",
            &[(expected.as_str(), "https://example.com/bin")],
        ));

        let outcome = updater.update().await.expect("cycle should succeed");

        assert!(matches!(outcome, UpdateOutcome::NoUpdateAvailable { .. }));
        assert_eq!(requester.requested_urls().len(), 1);
        assert!(replacer.images().is_empty());
    }

    #[tokio::test]
    async fn unparseable_tag_is_a_version_error() {
        let (updater, requester, _) = scripted_updater("1.0.0", "myapp-");
        requester.push_bytes(release_json("nightly", &[]));

        let error = updater.update().await.expect_err("tag should not parse");
        assert!(matches!(error, UpdateError::VersionParse { ref version } if version == "nightly"));
    }

    #[tokio::test]
    async fn resolve_failure_propagates_unchanged() {
        let (updater, requester, _) = scripted_updater("1.0.0", "myapp-");
        requester.push_error("connection reset");

        let error = updater.update().await.expect_err("resolution should fail");
        assert!(matches!(
            error,
            UpdateError::ResolveRelease(FetchError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn check_update_available_caches_release() {
        let (updater, requester, replacer) = scripted_updater("1.0.0", "myapp-");
        requester.push_bytes(release_json("1.1.0", &[]));
        requester.push_bytes(release_json("1.0.0", &[]));

        let newer = updater
            .check_update_available()
            .await
            .expect("check should succeed");
        assert_eq!(newer.map(|release| release.tag_name), Some("1.1.0".to_string()));

        let same = updater
            .check_update_available()
            .await
            .expect("check should succeed");
        assert!(same.is_none());
        assert_eq!(
            updater.latest_release().await.map(|release| release.tag_name),
            Some("1.0.0".to_string())
        );
        assert!(replacer.images().is_empty());
    }

    #[tokio::test]
    async fn fetch_gz_returns_original_bytes() {
        let (updater, requester, _) = scripted_updater("1.0.0", "update-");
        requester.push_bytes(gzip(b"test binary content 12345"));

        let result = updater
            .fetch_gz("https://example.com/test.gz")
            .await
            .expect("fetch_gz should succeed");
        assert_eq!(result, b"test binary content 12345");
    }

    #[tokio::test]
    async fn fetch_gz_rejects_plain_content() {
        let (updater, requester, _) = scripted_updater("1.0.0", "update-");
        requester.push_bytes("not gzipped content");

        let error = updater
            .fetch_gz("https://example.com/test.gz")
            .await
            .expect_err("plain content should not decompress");
        assert!(matches!(error, UpdateError::Decompress(_)));
    }

    #[tokio::test]
    async fn fetch_gz_surfaces_network_errors() {
        let (updater, requester, _) = scripted_updater("1.0.0", "update-");
        requester.push_error("network error");

        let error = updater
            .fetch_gz("https://example.com/test.gz")
            .await
            .expect_err("network failure should propagate");
        assert!(error.to_string().contains("network error"));
        assert!(error.is_network());
    }

    #[tokio::test]
    async fn fetch_gz_reports_interrupted_body_as_network_error() {
        let (updater, requester, _) = scripted_updater("1.0.0", "update-");
        let partial = gzip(&[7u8; 4096])[..16].to_vec();
        requester.handle_request(move |_| {
            let stream: ByteStream = Box::pin(std::io::Cursor::new(partial).chain(ResetBody));
            Ok(Some(stream))
        });

        let error = updater
            .fetch_gz("https://example.com/test.gz")
            .await
            .expect_err("interrupted download should fail");

        assert!(matches!(error, UpdateError::Fetch(FetchError::Body { .. })));
        assert!(error.is_network());
        assert!(error.to_string().starts_with("fetch failed: "));
    }

    #[tokio::test]
    async fn fetch_rejects_success_without_stream() {
        let (updater, requester, _) = scripted_updater("1.0.0", "update-");
        requester.handle_request(|_| Ok(None));

        let error = updater
            .fetch("https://example.com/test")
            .await
            .err()
            .expect("missing stream should fail");
        assert!(matches!(error, FetchError::MissingStream { .. }));
        assert!(error.to_string().contains("missing response stream"));
    }

    #[tokio::test]
    async fn fetch_passes_stream_through() {
        let (updater, requester, _) = scripted_updater("1.0.0", "update-");
        requester.handle_request(|_| Ok(Some(stream_from_bytes(b"payload".to_vec()))));

        let stream = updater
            .fetch("https://example.com/test")
            .await
            .ok()
            .expect("fetch should succeed");
        let body = read_body("https://example.com/test", stream)
            .await
            .expect("body should be readable");
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn fetch_without_requester_uses_http() {
        let updater = Updater::new("1.0.0", "ao-data", "go-githubupdate", "update-");
        let result = updater.fetch("http://nonexistent.invalid/").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_cycles_never_interleave() {
        let (updater, requester, replacer) = scripted_updater("1.0.0", "myapp-");
        let expected = expected_asset_name("myapp-");
        let json = release_json("2.0.0", &[(expected.as_str(), "https://example.com/bin")]);

        let (mut release_writer, release_reader) = tokio::io::duplex(64 * 1024);
        requester.handle_request(move |_| {
            let stream: ByteStream = Box::pin(release_reader);
            Ok(Some(stream))
        });
        requester.push_bytes(gzip(b"v2 image"));
        requester.push_bytes(json.clone());
        let updater = Arc::new(updater);

        let first = tokio::spawn({
            let updater = Arc::clone(&updater);
            async move { updater.update().await }
        });
        for _ in 0..250 {
            if !requester.requested_urls().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(requester.requested_urls().len(), 1);

        let second = tokio::spawn({
            let updater = Arc::clone(&updater);
            async move { updater.update().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The first cycle is still reading the release body and holds the lock.
        assert_eq!(requester.requested_urls().len(), 1);
        assert!(!second.is_finished());

        release_writer
            .write_all(json.as_bytes())
            .await
            .expect("release body should be written");
        drop(release_writer);

        let first = first
            .await
            .expect("first task should join")
            .expect("first cycle should succeed");
        let second = second
            .await
            .expect("second task should join")
            .expect("second cycle should succeed");

        assert_eq!(
            first,
            UpdateOutcome::Updated {
                version: "2.0.0".to_string()
            }
        );
        assert_eq!(
            second,
            UpdateOutcome::NoUpdateAvailable {
                latest: "2.0.0".to_string()
            }
        );
        assert_eq!(replacer.images(), [b"v2 image".to_vec()]);
        assert_eq!(
            requester.requested_urls(),
            [
                "https://api.github.com/repos/ao-data/go-githubupdate/releases/latest",
                "https://example.com/bin",
                "https://api.github.com/repos/ao-data/go-githubupdate/releases/latest",
            ]
        );
    }

    #[tokio::test]
    async fn background_reports_first_cycle_and_stops_on_shutdown() {
        let (updater, requester, replacer) = scripted_updater("1.0.0", "myapp-");
        let expected = expected_asset_name("myapp-");
        requester.push_bytes(release_json("1.0.0", &[]));
        requester.push_bytes(release_json(
            "2.0.0",
            &[(expected.as_str(), "https://example.com/bin")],
        ));
        requester.push_bytes(gzip(b"v2 image"));
        let updater = Arc::new(updater);

        let (first, handle) = updater.start_background(Duration::from_millis(20)).await;
        assert_eq!(
            first.expect("first cycle should succeed"),
            UpdateOutcome::NoUpdateAvailable {
                latest: "1.0.0".to_string()
            }
        );

        for _ in 0..250 {
            if !replacer.images().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(replacer.images(), [b"v2 image".to_vec()]);

        // Exhausted handlers make later cycles fail; polling keeps going.
        let calls_after_install = requester.requested_urls().len();
        for _ in 0..250 {
            if requester.requested_urls().len() > calls_after_install {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(requester.requested_urls().len() > calls_after_install);
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }
}
