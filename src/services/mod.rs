//! Service layer: identity, documents, search projection and the
//! outbound integrations (email, object storage).

pub mod accounts;
pub mod documents;
pub mod email;
pub mod search;
pub mod storage;

pub use accounts::{AccountError, AccountService, IssuedTokens};
pub use documents::{DocumentError, DocumentService};
pub use email::{
    CapturingChannel, ChannelError, ConsoleChannel, NotificationChannel, SendGridChannel,
};
pub use search::SearchQuery;
pub use storage::{DocumentStore, LocalDocumentStore, StorageError, UploadHandle};
