// Connection manager: lifecycle, subscriptions, pending sends
pub mod client;

// Configuration
pub mod config;

// Wire frames and naming conventions
pub mod protocol;

// Transport session abstraction and websocket adapter
pub mod transport;
