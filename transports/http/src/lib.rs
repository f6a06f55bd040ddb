mod config;
mod transport;

pub use config::HttpTransportConfig;
pub use transport::HttpTransport;
