//! Calendar provider integration for absence management.
//!
//! This crate holds everything that talks to, or decides whether to talk to,
//! an external calendar provider:
//!
//! - [`AuthorizationFlowController`] - OAuth2 authorization-code handshake
//!   that obtains and stores a refresh token
//! - [`CredentialStore`] - persistence of client credentials and refresh token
//! - [`SyncGate`] - whether synchronization is currently permitted
//! - [`CalendarApi`] - the provider seam, implemented for Google
//!
//! # Architecture
//!
//! ```text
//!   HTTP callback
//!        │
//!        ▼
//! ┌──────────────────────────────┐     ┌──────────────┐
//! │ AuthorizationFlowController  │────▶│ CalendarApi  │──▶ Google
//! └──────────────┬───────────────┘     └──────────────┘
//!                │ save
//!                ▼
//!       ┌─────────────────┐  get  ┌──────────┐
//!       │ CredentialStore │◀──────│ SyncGate │◀── scheduled jobs
//!       └─────────────────┘       └──────────┘
//! ```

pub mod error;
pub mod gate;
#[cfg(feature = "google")]
pub mod google;
pub mod handshake;
pub mod pkce;
pub mod provider;
pub mod settings;
pub mod store;

// Re-export main types at crate root
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use gate::{SyncGate, SyncStatus};
pub use handshake::{
    AuthorizationFlowController, AuthorizationState, CALENDAR_SCOPE, DEFAULT_FLOW_TTL,
    FlowStateStore, HandshakeError, HandshakeOutcome, MemoryFlowStore, ProbeOutcome,
};
pub use pkce::PkceFlow;
pub use provider::{
    AuthorizationRequest, BoxFuture, CalendarApi, CalendarProbe, ClientIdentity, TokenGrant,
};
pub use settings::{ProviderCredentials, ProviderKind, SyncSettings};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
