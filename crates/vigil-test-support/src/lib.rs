#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Shared test helpers used across integration suites.
//! Layout: fetch.rs (scripted fetch channel), store.rs (write-counting
//! preferences), fixtures.rs (URLs, response builders, scheduling helpers),
//! logging.rs (captured tracing output).

pub mod fetch;
pub mod fixtures;
pub mod logging;
pub mod store;

pub use fetch::{HeldFetch, ScriptedFetchChannel};
pub use logging::init_test_logging;
pub use store::CountingStore;
