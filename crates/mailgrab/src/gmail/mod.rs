//! Gmail API access: OAuth session, search/fetch client, and
//! attachment extraction.

pub mod auth;
pub mod client;
pub mod extract;
pub mod model;

pub use auth::AuthSession;
pub use client::{GmailClient, SearchStream};
pub use extract::{candidates, extension_matches, AttachmentCandidate};
pub use model::{Message, MessageList, MessagePart, MessageRef};
