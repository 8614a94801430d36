pub mod request;
pub mod route;
pub mod stream_epoch;

pub use request::{FederatedRequest, Format, HttpMethod};
pub use route::{Priority, Route};
pub use stream_epoch::{StreamEpoch, Timestamp};
