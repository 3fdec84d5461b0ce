//! Web view host.
//!
//! Rendering is delegated to an external browser running in kiosk mode; the
//! host only decides which URL it shows and whether it is fullscreen.

use std::process::{Child, Command, Stdio};
use tablet_core::config::WebViewConfig;

/// Something that can show a URL full-screen.
pub trait WebView {
    fn load(&mut self, url: &str);
    fn set_fullscreen(&mut self, fullscreen: bool);
    fn is_fullscreen(&self) -> bool;
    fn close(&mut self);
}

/// Runs the configured browser as a child process, restarting it whenever
/// the URL or the fullscreen mode changes. Launch failures are logged.
pub struct KioskBrowser {
    browser: String,
    args: Vec<String>,
    url: Option<String>,
    fullscreen: bool,
    child: Option<Child>,
}

impl KioskBrowser {
    pub fn new(config: &WebViewConfig) -> Self {
        Self {
            browser: config.browser.clone(),
            args: config.args.clone(),
            url: None,
            fullscreen: true,
            child: None,
        }
    }

    fn command_line(&self, url: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(if self.fullscreen { "--kiosk" } else { "--start-maximized" }.to_string());
        args.push(url.to_string());
        args
    }

    fn relaunch(&mut self) {
        self.stop_child();
        let Some(url) = self.url.clone() else {
            return;
        };
        let args = self.command_line(&url);
        // stdin belongs to the shortcut reader.
        match Command::new(&self.browser)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                tracing::info!(
                    browser = %self.browser,
                    pid = child.id(),
                    url = %url,
                    fullscreen = self.fullscreen,
                    "web view launched"
                );
                self.child = Some(child);
            }
            Err(err) => {
                tracing::error!(error = %err, browser = %self.browser, url = %url, "web view launch failed");
            }
        }
    }

    fn stop_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Already exited is fine; kill only errors then.
            let _ = child.kill();
            if let Err(err) = child.wait() {
                tracing::warn!(error = %err, "web view did not exit cleanly");
            }
        }
    }
}

impl WebView for KioskBrowser {
    fn load(&mut self, url: &str) {
        self.url = Some(url.to_string());
        self.relaunch();
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        if self.fullscreen == fullscreen {
            return;
        }
        self.fullscreen = fullscreen;
        self.relaunch();
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn close(&mut self) {
        self.stop_child();
    }
}

impl Drop for KioskBrowser {
    fn drop(&mut self) {
        self.stop_child();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser(program: &str) -> KioskBrowser {
        KioskBrowser::new(&WebViewConfig {
            browser: program.into(),
            args: vec!["--noerrdialogs".into()],
        })
    }

    #[test]
    fn test_command_line_fullscreen() {
        let mut web = browser("chromium");
        assert_eq!(
            web.command_line("http://ha.lan"),
            vec!["--noerrdialogs", "--kiosk", "http://ha.lan"]
        );
        web.fullscreen = false;
        assert_eq!(
            web.command_line("http://ha.lan"),
            vec!["--noerrdialogs", "--start-maximized", "http://ha.lan"]
        );
    }

    #[test]
    fn test_missing_browser_is_not_fatal() {
        let mut web = browser("/nonexistent/browser");
        web.load("http://ha.lan");
        assert!(web.child.is_none());
        web.close();
    }

    #[test]
    fn test_fullscreen_toggle_without_url_does_not_launch() {
        let mut web = browser("/nonexistent/browser");
        web.set_fullscreen(false);
        assert!(!web.is_fullscreen());
        assert!(web.child.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_relaunch_replaces_child() {
        // `sh -c` takes the kiosk flag and URL as positional args and ignores them.
        let mut web = KioskBrowser::new(&WebViewConfig {
            browser: "sh".into(),
            args: vec!["-c".into(), "sleep 5".into(), "sh".into()],
        });
        web.load("http://one");
        let first = web.child.as_ref().map(|c| c.id());
        web.load("http://two");
        let second = web.child.as_ref().map(|c| c.id());
        assert!(first.is_some() && second.is_some());
        assert_ne!(first, second);
        web.close();
        assert!(web.child.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_browser_does_not_share_stdin() {
        let mut web = KioskBrowser::new(&WebViewConfig {
            browser: "sh".into(),
            args: vec!["-c".into(), "if read -r _; then exit 3; fi".into(), "sh".into()],
        });
        web.load("http://ha.lan");
        let mut child = web.child.take().unwrap();
        // Reading hits end of input at once instead of taking a line.
        assert!(child.wait().unwrap().success());
    }
}
