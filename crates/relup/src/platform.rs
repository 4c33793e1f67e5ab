use std::sync::LazyLock;

static PLATFORM: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{}-{}",
        release_os(std::env::consts::OS),
        release_arch(std::env::consts::ARCH)
    )
    .to_ascii_lowercase()
});

/// `"<os>-<arch>"` of the running process in release naming, for example
/// `linux-amd64` or `darwin-arm64`.
#[must_use]
pub fn platform() -> &'static str {
    PLATFORM.as_str()
}

/// Name of the release asset carrying the binary for this platform.
#[must_use]
pub fn expected_asset_name(file_prefix: &str) -> String {
    asset_name_for(file_prefix, platform(), cfg!(target_os = "windows"))
}

fn asset_name_for(file_prefix: &str, platform: &str, windows: bool) -> String {
    if windows {
        format!("{file_prefix}{platform}.exe.gz")
    } else {
        format!("{file_prefix}{platform}.gz")
    }
}

/// Release assets use `darwin` for macOS; other OS names pass through.
fn release_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn release_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "arm" => "arm",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        "loongarch64" => "loong64",
        other => other,
    }
}
