use async_trait::async_trait;

use crate::Result;

/// Delivery channel for alert text.
///
/// Failures are reported as `Error::Notifier`; callers log them and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Escape text interpolated into an HTML-mode message.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
