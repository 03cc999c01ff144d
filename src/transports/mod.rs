//! Transport implementations for the XL Spaceship user API.
//!
//! Concrete [`Transport`](crate::Transport) implementations live behind
//! feature gates. Enable the corresponding Cargo feature to pull one in:
//!
//! | Feature          | Transport         |
//! |------------------|-------------------|
//! | `transport-http` | [`HttpTransport`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), xlspaceship_client::error::RequestError> {
//! use xlspaceship_client::{HttpTransport, Transport};
//!
//! let http = HttpTransport::new("http://localhost:8080")?;
//! let me = http.whoami().await?;
//! println!("playing as {}", me.full_name);
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-http")]
pub mod http;

#[cfg(feature = "transport-http")]
pub use http::HttpTransport;
