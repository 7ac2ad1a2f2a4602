//! Authenticated session client for the Almacén warehouse REST API.
//!
//! The crate wraps outgoing HTTP requests with a bearer credential, recovers
//! once from an expired access token by exchanging the refresh token, and
//! ends the session (clearing tokens and redirecting to login) when that
//! exchange fails. Concurrent expirations share a single exchange.
//!
//! Layout:
//! - [`client`]: [`SessionClient`], the send/refresh/login core
//! - [`storage`]: persisted credentials behind [`TokenStore`]
//! - [`transport`]: the HTTP seam and its `reqwest` implementation
//! - [`api`]: typed warehouse endpoints

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod navigator;
pub mod state;
pub mod storage;
pub mod transport;

pub use api::AlmacenApi;
pub use client::SessionClient;
pub use config::{AuthHeaderPolicy, SessionConfig};
pub use error::{RefreshError, SessionError, StorageError};
pub use navigator::{LocationNavigator, Navigator};
pub use state::{SessionPhase, SessionState, UserProfile};
pub use storage::{FileStore, MemoryStore, TokenStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
