pub mod allocator;
pub mod cleaner;
pub mod generator;
pub mod url_service;
pub mod validation;

pub use allocator::HashAllocator;
pub use cleaner::UrlCleaner;
pub use generator::{GeneratorPool, HashGenerator};
pub use url_service::{ResolvedUrl, UrlService};
