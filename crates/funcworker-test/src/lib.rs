//! funcworker Test - Shared test utilities for the funcworker runtime.
//!
//! This crate provides a scriptable engine, message fixtures and a harness
//! that runs a dispatcher over an in-memory transport.
//!
//! # Usage
//!
//! ```rust,ignore
//! use funcworker_test::{MockEngineFactory, WorkerHarness, test_worker_init};
//!
//! #[tokio::test]
//! async fn test_init() {
//!     let factory = MockEngineFactory::new();
//!     let mut worker = WorkerHarness::start(factory, Default::default());
//!
//!     let response = worker.request(test_worker_init("r1")).await;
//!     assert_eq!(response.request_id, "r1");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
