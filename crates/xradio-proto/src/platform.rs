use std::path::{Path, PathBuf};

/// Directory name used under the per-user config, cache and data roots.
pub const BUNDLE: &str = "xradio";

pub fn config_dir() -> PathBuf {
    // Always ~/.config/xradio, also on macOS (no Application Support).
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(BUNDLE)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(BUNDLE)
    }
}

pub fn cache_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".cache")
            .join(BUNDLE)
    }
    #[cfg(windows)]
    {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(BUNDLE)
    }
}

pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(BUNDLE)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(BUNDLE)
    }
}

/// `~/Music/xradio`, falling back to the home directory when the system has
/// no audio directory configured.
pub fn default_downloads_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(BUNDLE)
}

/// Hotkey bindings file, shared by every station.
pub fn hotkeys_path() -> PathBuf {
    config_dir().join("hotkeys.json")
}

/// Channel catalog cache of one station.
pub fn catalog_cache_path(station_key: &str) -> PathBuf {
    cache_dir().join(format!("{}.json", station_key))
}

/// Directory receiving downloads of one channel.
pub fn channel_download_dir(root: &Path, station_key: &str, channel_title: &str) -> PathBuf {
    root.join(station_key)
        .join(crate::model::safe_filename(channel_title))
}

#[cfg(unix)]
pub fn mpv_socket_name() -> String {
    format!("{}/xradio-mpv.sock", std::env::temp_dir().display())
}

#[cfg(windows)]
pub fn mpv_socket_name() -> String {
    "xradio-mpv".to_string()
}

#[cfg(unix)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server={}", mpv_socket_name())
}

#[cfg(windows)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name())
}

// ── external binaries ─────────────────────────────────────────────────────────

#[cfg(unix)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv"]
}

#[cfg(windows)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv.exe", "mpv"]
}

#[cfg(unix)]
fn ffmpeg_binary_names() -> &'static [&'static str] {
    &["ffmpeg"]
}

#[cfg(windows)]
fn ffmpeg_binary_names() -> &'static [&'static str] {
    &["ffmpeg.exe", "ffmpeg"]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    names.iter().map(|name| dir.join(name)).find(|p| p.exists())
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        for name in names {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

fn find_binary(env_override: &str, names: &[&str]) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_override) {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }
    find_beside_exe(names).or_else(|| find_on_path(names))
}

/// Find ffmpeg, used to transcode downloaded tracks.
/// Checks `FFMPEG_PATH`, then beside the executable, then PATH.
pub fn find_ffmpeg_binary() -> Option<PathBuf> {
    find_binary("FFMPEG_PATH", ffmpeg_binary_names())
}

/// Find mpv, the playback engine.
/// Checks `MPV_PATH`, then beside the executable, then PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    find_binary("MPV_PATH", mpv_binary_names())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_use_bundle_dirs() {
        assert!(hotkeys_path().ends_with("xradio/hotkeys.json"));
        assert!(catalog_cache_path("jazzradio").ends_with("xradio/jazzradio.json"));
    }

    #[test]
    fn test_channel_download_dir_is_sanitized() {
        let dir = channel_download_dir(Path::new("/music"), "rockradio", "Hard/Heavy");
        assert_eq!(dir, PathBuf::from("/music/rockradio/Hard-Heavy"));
    }
}
