//! Test support utilities for end-to-end testing

pub mod harness;
#[path = "../../../postal-delivery/tests/support/mock_server.rs"]
pub mod mock_server;

pub use harness::E2ETestHarness;
pub use mock_server::SmtpCommand;
