pub mod app;
pub mod error;
pub mod proxy;

pub use error::ProxyError;
pub use proxy::ProxyHandler;
