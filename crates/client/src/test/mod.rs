//! Test clients for logd
//!
//! Simple clients for testing and benchmarking.
//! No batching, no acknowledgements - just connect and send.
//!
//! # Example
//!
//! ```ignore
//! use logd_client::test::UnixTestClient;
//!
//! let mut client = UnixTestClient::connect("logd.sock").await?;
//! client.send(b"hello").await?;
//! client.close().await?;
//! ```


pub use unix::UnixTestClient;
