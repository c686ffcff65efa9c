//! System browser sign-in surface.
//!
//! Opens the authorization page in the default browser. A terminal has no
//! URL handler, so the user pastes the redirected callback URL back in.

use async_trait::async_trait;
use auth_session::{ExternalAuthSurface, PresentationOptions, SurfaceOutcome};
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};
use url::Url;

pub struct BrowserSurface;

#[async_trait]
impl ExternalAuthSurface for BrowserSurface {
    async fn present(&self, url: &Url, options: &PresentationOptions) -> SurfaceOutcome {
        if let Err(e) = open::that(url.as_str()) {
            warn!(error = %e, "Failed to open browser");
            return SurfaceOutcome::LaunchFailed(e.to_string());
        }
        debug!(
            ephemeral = options.prefers_ephemeral_session,
            "Opened authorization page in the system browser"
        );

        eprintln!("Finish signing in in your browser.");
        eprintln!(
            "Then paste the {}:// address your browser was sent to (empty line cancels):",
            options.callback_scheme
        );

        let scheme = options.callback_scheme.clone();
        let pasted = tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            read_callback(stdin.lock(), &scheme)
        })
        .await;

        match pasted {
            Ok(Some(url)) => SurfaceOutcome::Callback(url),
            Ok(None) => SurfaceOutcome::Cancelled,
            Err(e) => SurfaceOutcome::LaunchFailed(e.to_string()),
        }
    }
}

/// Read lines until one parses as a URL on `scheme`.
///
/// An empty line, EOF or a read error is cancellation.
pub fn read_callback(reader: impl BufRead, scheme: &str) -> Option<Url> {
    for line in reader.lines() {
        let Ok(line) = line else {
            return None;
        };
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match Url::parse(line) {
            Ok(url) if url.scheme().eq_ignore_ascii_case(scheme) => return Some(url),
            _ => {
                eprint!("Not a {}:// address, try again: ", scheme);
                let _ = io::stderr().flush();
            }
        }
    }
    None
}
