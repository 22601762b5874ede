//! Data-access layer
//!
//! The core treats persistence as an abstract capability: the traits in
//! [`traits`] describe exactly what the session controller, the buffer
//! strategy engine and the health surface need from external collaborators.
//! [`memory`] provides the in-process reference implementations that back
//! the session controller's active index, the test suite and standalone
//! deployments.

pub mod memory;
pub mod traits;

pub use memory::{
    InMemoryBufferMetrics, InMemoryDatabasePing, InMemoryListeningHistory, InMemorySessionStore,
    InMemorySongCatalog, InMemorySubscriberDirectory,
};
pub use traits::{
    BufferMetricsRepository, DatabasePing, ListeningHistory, SessionRepository, SongCatalog,
    SubscriberDirectory,
};
