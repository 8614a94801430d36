pub mod formats;
pub mod splitter;
pub mod worker;

pub use splitter::{fetch_with_splitting, FetchOutcome};
pub use worker::EndpointWorker;
