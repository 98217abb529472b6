pub mod providers;

pub use providers::{UpstreamClient, UpstreamError};
