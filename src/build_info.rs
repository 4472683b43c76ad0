//! Build-time identity sent to brokers as the request `client_id`.

/// The `client_id` used when [`ClientBuilder::client_id`](crate::client::ClientBuilder::client_id)
/// isn't called.
pub const DEFAULT_CLIENT_ID: &str = concat!("logbroker-client-", env!("CARGO_PKG_VERSION"));
