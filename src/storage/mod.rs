mod connection;
pub mod hash_store;
pub mod retry;
pub mod url_store;

pub use connection::{connect_postgres, run_migrations};
pub use hash_store::{HashStore, SqlHashStore};
pub use retry::{with_retry, with_retry_if, RetryPolicy};
pub use url_store::{InsertOutcome, SqlUrlStore, UrlStore};
