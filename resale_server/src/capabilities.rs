//! Concrete notifiers and backup services for the server process.
//!
//! The engine only knows the [`Notifier`] and [`BackupService`] traits. The server picks an implementation at start-up
//! from the configuration, and wraps the choice in an enum so that the background workers stay fully concrete.
use std::sync::Arc;

use log::*;
use reqwest::Client;
use resale_engine::{
    db_types::{NoticeKind, OrderNotice},
    format_notice,
    BackupError,
    BackupService,
    NoBackup,
    Notifier,
    NotifierError,
    SqliteBackup,
};
use serde_json::json;

/// Writes notices to the log. Used when no notifier endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send_notice(&self, kind: NoticeKind, notices: &[OrderNotice]) -> Result<(), NotifierError> {
        info!("📣️ {}", format_notice(kind, notices));
        Ok(())
    }
}

/// POSTs each notice as JSON to a chat relay or similar endpoint.
///
/// The body carries the notice kind, the rendered text and the structured rows:
/// `{"kind": "SameDayExpiry", "text": "...", "orders": [...]}`
#[derive(Clone)]
pub struct HttpNotifier {
    url: String,
    client: Arc<Client>,
}

impl HttpNotifier {
    pub fn new(url: &str) -> Result<Self, NotifierError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(NotifierError::Configuration(format!("{url} is not an http(s) URL")));
        }
        let client = Client::builder().build().map_err(|e| NotifierError::Configuration(e.to_string()))?;
        Ok(Self { url: url.to_string(), client: Arc::new(client) })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for HttpNotifier {
    async fn send_notice(&self, kind: NoticeKind, notices: &[OrderNotice]) -> Result<(), NotifierError> {
        let body = json!({ "kind": kind, "text": format_notice(kind, notices), "orders": notices });
        trace!("📣️ Posting {kind} notice to {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifierError::DeliveryFailed { kind, reason: e.to_string() })?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(NotifierError::DeliveryFailed { kind, reason: format!("{status} {message}") })
        }
    }
}

#[derive(Clone)]
pub enum ServerNotifier {
    Log(LogNotifier),
    Http(HttpNotifier),
}

impl ServerNotifier {
    /// An HTTP notifier if a usable URL is given, and the log notifier otherwise.
    pub fn from_url(url: Option<&str>) -> Self {
        match url.map(HttpNotifier::new) {
            Some(Ok(notifier)) => {
                info!("📣️ Advance notices will be posted to {}", notifier.url());
                Self::Http(notifier)
            },
            Some(Err(e)) => {
                error!("📣️ {e}. Advance notices will only be logged.");
                Self::Log(LogNotifier)
            },
            None => Self::Log(LogNotifier),
        }
    }
}

impl Notifier for ServerNotifier {
    async fn send_notice(&self, kind: NoticeKind, notices: &[OrderNotice]) -> Result<(), NotifierError> {
        match self {
            Self::Log(n) => n.send_notice(kind, notices).await,
            Self::Http(n) => n.send_notice(kind, notices).await,
        }
    }
}

#[derive(Clone)]
pub enum ServerBackup {
    Sqlite(SqliteBackup),
    Disabled(NoBackup),
}

impl BackupService for ServerBackup {
    async fn backup_now(&self) -> Result<(), BackupError> {
        match self {
            Self::Sqlite(b) => b.backup_now().await,
            Self::Disabled(b) => b.backup_now().await,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn notifier_selection() {
        assert!(matches!(ServerNotifier::from_url(None), ServerNotifier::Log(_)));
        assert!(matches!(ServerNotifier::from_url(Some("ftp://example.com")), ServerNotifier::Log(_)));
        assert!(matches!(ServerNotifier::from_url(Some("https://example.com/hook")), ServerNotifier::Http(_)));
    }

    #[actix_web::test]
    async fn log_notifier_always_delivers() {
        let _ = env_logger::try_init();
        assert!(LogNotifier.send_notice(NoticeKind::SameDayExpiry, &[]).await.is_ok());
    }
}
