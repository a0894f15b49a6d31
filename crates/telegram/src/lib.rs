pub mod notifier;

use std::sync::Arc;

use tracing::{info, warn};

use common::{Config, Notifier, Result};

pub use notifier::{parse_recipient, LogNotifier, TelegramNotifier};

/// Telegram when both credentials are configured, otherwise the log fallback.
pub fn notifier_from_config(cfg: &Config) -> Result<Arc<dyn Notifier>> {
    match (&cfg.telegram_token, &cfg.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            info!("Alerts will be delivered via Telegram");
            Ok(Arc::new(TelegramNotifier::new(
                token.clone(),
                chat_id,
                cfg.notify_timeout,
            )?))
        }
        _ => {
            warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set, alerts go to the log only");
            Ok(Arc::new(LogNotifier))
        }
    }
}
