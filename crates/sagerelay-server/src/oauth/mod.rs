//! Credential exchange against the provider's OAuth endpoints, with the
//! redirect state sealed in an opaque authenticated blob.

pub mod exchange;
pub mod routes;
pub mod state;

pub use exchange::{classify_persist_status, CredentialExchange, OAuthError, PersistVerdict};
pub use state::{CredentialState, StateCipher, StateError};
