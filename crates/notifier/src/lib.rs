//! Chat transport and image delivery.
//!
//! - [`TelegramClient`]: Telegram Bot API over HTTPS (long polling + uploads)
//! - [`DeliveryChannel`]: best-effort, per-recipient fault-isolated fan-out

pub mod delivery;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod telegram;
pub mod transport;

pub use delivery::{DeliveryChannel, DeliveryReport};
pub use telegram::TelegramClient;
pub use transport::{Transport, TransportError, Update};
