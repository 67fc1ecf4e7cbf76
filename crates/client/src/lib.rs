//! logd Client Library
//!
//! Clients and message helpers for exercising a running logd daemon:
//!
//! - **Testing**: integration tests drive the daemon through real sockets
//! - **Benchmarking**: the `loadtest` binary uses the same client
//!
//! # Quick Start
//!
//! ```ignore
//! use logd_client::test::UnixTestClient;
//! use logd_client::tagged_message;
//!
//! let mut client = UnixTestClient::connect("logd.sock").await?;
//! client.send(&tagged_message(1, 0, 128)).await?;
//! client.close().await?;
//! ```

mod error;
mod tagged;

pub mod test;

pub use error::{ClientError, Result};
pub use tagged::{TAG_LEN, parse_tag, tagged_message};
