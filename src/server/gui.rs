//! Desktop window mode
//!
//! Opens the front-end in a Chromium-family browser running in app mode
//! (no tabs, no address bar). The server lives as long as the window.

use crate::error::{InpaintError, Result};
use axum::Router;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};

/// Environment variable naming an explicit browser executable
pub const BROWSER_ENV: &str = "LAMA_CLEANER_BROWSER";

const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "microsoft-edge",
    "brave-browser",
    "chrome",
    "msedge",
];

#[cfg(target_os = "macos")]
const APP_BUNDLES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(not(target_os = "macos"))]
const APP_BUNDLES: &[&str] = &[];

fn executable_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = dir.join(name);
    if candidate.is_file() {
        return Some(candidate);
    }
    if cfg!(windows) {
        let exe = dir.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
    }
    None
}

/// Locate a Chromium-family browser
///
/// Checks `LAMA_CLEANER_BROWSER`, then `PATH`, then well-known install locations.
#[must_use]
pub fn find_browser() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(BROWSER_ENV) {
        let path = PathBuf::from(explicit);
        if path.is_file() {
            return Some(path);
        }
        log::warn!("{} points to a missing file: {}", BROWSER_ENV, path.display());
    }

    let search_path = std::env::var_os("PATH").unwrap_or_default();
    let dirs: Vec<PathBuf> = std::env::split_paths(&search_path).collect();
    BROWSER_CANDIDATES
        .iter()
        .find_map(|name| dirs.iter().find_map(|dir| executable_in(dir, name)))
        .or_else(|| {
            APP_BUNDLES
                .iter()
                .map(PathBuf::from)
                .find(|path| path.is_file())
        })
}

/// Browser arguments for an app-mode window
#[must_use]
pub fn app_args(url: &str, size: (u32, u32), profile_dir: &Path) -> Vec<String> {
    vec![
        format!("--app={url}"),
        format!("--window-size={},{}", size.0, size.1),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
    ]
}

/// Spawn the browser window pointing at `url`
///
/// # Errors
/// - No supported browser found
/// - Failed to spawn the browser process
pub fn launch_window(url: &str, size: (u32, u32), profile_dir: &Path) -> Result<Child> {
    let browser = find_browser().ok_or_else(|| {
        InpaintError::invalid_config(format!(
            "No Chromium-family browser found for --gui. Install Chrome/Chromium/Edge or set {BROWSER_ENV}."
        ))
    })?;
    log::info!("Opening {} in {}", url, browser.display());

    Command::new(&browser)
        .args(app_args(url, size, profile_dir))
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| InpaintError::file_io_error("launch browser", &browser, &e))
}

/// Fresh browser profile directory for one window session
///
/// # Errors
/// - Failed to create the directory
pub fn window_profile_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("lama-cleaner-window-")
        .tempdir()
        .map_err(InpaintError::Io)
}

/// Serve `app` on `listener` inside a desktop window
///
/// Returns when the window is closed or Ctrl-C is received.
///
/// # Errors
/// - No browser available or failed to start it
/// - Server I/O failure
pub async fn run_window(listener: TcpListener, app: Router, size: (u32, u32)) -> Result<()> {
    let addr = listener.local_addr()?;
    let url = format!("http://127.0.0.1:{}/", addr.port());

    // Removed when this function returns
    let profile_dir = window_profile_dir()?;
    let mut child = launch_window(&url, size, profile_dir.path())?;

    let window_closed = async move {
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => log::info!("Window closed ({status})"),
                Err(e) => log::warn!("Failed to wait for window process: {e}"),
            },
            () = super::shutdown_signal() => {
                if let Err(e) = child.kill().await {
                    log::warn!("Failed to close window: {e}");
                }
            },
        }
    };

    super::serve(listener, app, window_closed).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_args() {
        let profile = PathBuf::from("/tmp/profile");
        let args = app_args("http://127.0.0.1:8080/", (1600, 1000), &profile);
        assert_eq!(args[0], "--app=http://127.0.0.1:8080/");
        assert_eq!(args[1], "--window-size=1600,1000");
        assert_eq!(args[2], "--user-data-dir=/tmp/profile");
    }

    #[test]
    fn test_executable_lookup() {
        let dir = tempfile::tempdir().unwrap();
        assert!(executable_in(dir.path(), "chromium").is_none());

        std::fs::write(dir.path().join("chromium"), b"").unwrap();
        assert_eq!(
            executable_in(dir.path(), "chromium"),
            Some(dir.path().join("chromium"))
        );
    }

    #[test]
    fn test_profile_dirs_are_unique_and_removed() {
        let first = window_profile_dir().unwrap();
        let second = window_profile_dir().unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("lama-cleaner-window-"));

        let path = first.path().to_path_buf();
        std::fs::write(path.join("Local State"), b"{}").unwrap();
        drop(first);
        assert!(!path.exists());
    }
}
