//! Common test utilities and mock implementations


pub use mock_interface::MockBus;
pub use test_utils::{assert_float_eq, create_mock_driver};
