//! HTTP sources for external chat events.

pub mod errors;
pub mod provider;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::ConnectorError;
pub use provider::instagram::InstagramGraphSource;
pub use provider::telegram::TelegramBotSource;
