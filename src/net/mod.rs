//! Network setup for the listener.
//!
//! Plain TCP listeners are bound directly in `lifecycle::startup`; this
//! module only prepares TLS for `axum-server`.

pub mod tls;

pub use tls::load_tls_config;
