pub mod http;
pub mod traits;

pub use http::HttpSource;
pub use traits::RemoteSource;

#[cfg(test)]
pub use traits::MockRemoteSource;
