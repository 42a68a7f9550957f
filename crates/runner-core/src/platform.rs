use crate::error::RunnerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default remote working directory on Windows targets.
pub const WINDOWS_REMOTE_ROOT: &str = "C:\\VirtualClientScheduler";

/// Account substituted when the configured username is empty or a placeholder.
pub const FALLBACK_USERNAME: &str = "vclientuser";

const PLACEHOLDER_USERNAMES: &[&str] = &["", "username", "<username>"];

/// Target platform of a run, as configured per machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformTag {
    WindowsX64,
    WindowsArm64,
    LinuxX64,
    LinuxArm64,
}

impl PlatformTag {
    pub fn kind(&self) -> PlatformKind {
        match self {
            PlatformTag::WindowsX64 | PlatformTag::WindowsArm64 => PlatformKind::Windows,
            PlatformTag::LinuxX64 | PlatformTag::LinuxArm64 => PlatformKind::Posix,
        }
    }

    pub fn is_windows(&self) -> bool {
        self.kind() == PlatformKind::Windows
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformTag::WindowsX64 => write!(f, "windows-x64"),
            PlatformTag::WindowsArm64 => write!(f, "windows-arm64"),
            PlatformTag::LinuxX64 => write!(f, "linux-x64"),
            PlatformTag::LinuxArm64 => write!(f, "linux-arm64"),
        }
    }
}

impl FromStr for PlatformTag {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "windows-x64" => Ok(PlatformTag::WindowsX64),
            "windows-arm64" => Ok(PlatformTag::WindowsArm64),
            "linux-x64" => Ok(PlatformTag::LinuxX64),
            "linux-arm64" => Ok(PlatformTag::LinuxArm64),
            other => Err(RunnerError::Config(format!(
                "unknown platform tag: '{}'",
                other
            ))),
        }
    }
}

/// Archive formats the scheduler produces and consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveFormat {
    /// Select a format by file suffix. `None` for anything unrecognized.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }

    /// Suffix used when this side produces an archive.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Tar => "tar",
        }
    }
}

/// Path-joining and command-template rules, collapsed from the platform tag.
/// Dispatched once per operation so every match stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Windows,
    Posix,
}

impl PlatformKind {
    pub fn separator(&self) -> char {
        match self {
            PlatformKind::Windows => '\\',
            PlatformKind::Posix => '/',
        }
    }

    /// Join path segments with the platform separator. Trailing separators
    /// on segments are stripped so joins never double up.
    pub fn join(&self, segments: &[&str]) -> String {
        let sep = self.separator();
        let mut out = String::new();
        for segment in segments {
            let trimmed = segment.trim_end_matches(['/', '\\']);
            if trimmed.is_empty() {
                continue;
            }
            if out.is_empty() {
                out.push_str(trimmed);
            } else {
                out.push(sep);
                out.push_str(trimmed);
            }
        }
        out
    }

    /// Default remote working directory. POSIX roots live under the
    /// connecting user's home; placeholder usernames fall back to a fixed
    /// account so the path never embeds the literal placeholder.
    pub fn default_remote_dir(&self, username: &str) -> String {
        match self {
            PlatformKind::Windows => WINDOWS_REMOTE_ROOT.to_string(),
            PlatformKind::Posix => {
                format!("/home/{}/VirtualClientScheduler", effective_username(username))
            }
        }
    }

    pub fn tool_executable(&self) -> &'static str {
        match self {
            PlatformKind::Windows => "VirtualClient.exe",
            PlatformKind::Posix => "VirtualClient",
        }
    }

    /// Archive produced when compressing remote logs for retrieval.
    pub fn log_archive_format(&self) -> ArchiveFormat {
        match self {
            PlatformKind::Windows => ArchiveFormat::Zip,
            PlatformKind::Posix => ArchiveFormat::TarGz,
        }
    }

    /// Extraction command for a remote archive. Windows always uses the
    /// native cmdlet regardless of suffix; POSIX dispatches on the format.
    pub fn extract_command(&self, format: ArchiveFormat, archive: &str, dest: &str) -> String {
        match self {
            PlatformKind::Windows => format!(
                "powershell -NoProfile -NonInteractive -Command \
                 \"Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force\"",
                archive, dest
            ),
            PlatformKind::Posix => match format {
                ArchiveFormat::Zip => {
                    format!("mkdir -p '{}' && unzip -o '{}' -d '{}'", dest, archive, dest)
                }
                ArchiveFormat::TarGz => {
                    format!("mkdir -p '{}' && tar -xzf '{}' -C '{}'", dest, archive, dest)
                }
                ArchiveFormat::Tar => {
                    format!("mkdir -p '{}' && tar -xf '{}' -C '{}'", dest, archive, dest)
                }
            },
        }
    }

    /// Compression command packing `source_dir`'s contents into `archive`.
    pub fn compress_command(&self, source_dir: &str, archive: &str) -> String {
        match self {
            PlatformKind::Windows => format!(
                "powershell -NoProfile -NonInteractive -Command \
                 \"Compress-Archive -Path '{}\\*' -DestinationPath '{}' -Force\"",
                source_dir, archive
            ),
            PlatformKind::Posix => format!("tar -czf '{}' -C '{}' .", archive, source_dir),
        }
    }

    /// Command line launching the tool with the operator's opaque
    /// profile/parameter string appended verbatim.
    pub fn tool_command(&self, tool_path: &str, profile: &str) -> String {
        let quoted = match self {
            PlatformKind::Windows => format!("\"{}\"", tool_path),
            PlatformKind::Posix => format!("'{}'", tool_path),
        };
        if profile.trim().is_empty() {
            quoted
        } else {
            format!("{} {}", quoted, profile.trim())
        }
    }

    /// Best-effort remote file deletion.
    pub fn delete_command(&self, path: &str) -> String {
        match self {
            PlatformKind::Windows => format!(
                "powershell -NoProfile -NonInteractive -Command \
                 \"Remove-Item -LiteralPath '{}' -Force -ErrorAction SilentlyContinue\"",
                path
            ),
            PlatformKind::Posix => format!("rm -f '{}'", path),
        }
    }

    /// SFTP wire paths are always slash-separated, so Windows paths are
    /// re-joined with '/' for transfer-channel operations only.
    pub fn transfer_path(&self, path: &str) -> String {
        match self {
            PlatformKind::Windows => path.replace('\\', "/"),
            PlatformKind::Posix => path.to_string(),
        }
    }
}

fn effective_username(username: &str) -> &str {
    let trimmed = username.trim();
    if PLACEHOLDER_USERNAMES.contains(&trimmed.to_ascii_lowercase().as_str()) {
        FALLBACK_USERNAME
    } else {
        trimmed
    }
}
