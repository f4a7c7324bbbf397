//! This module provides reusable test utilities:
//! - Fake service control and maintenance store
//! - Fast engine settings
//! - In-memory and file-backed test databases
//! - Content trees for transfer tests

// Allow unused code in test fixtures - each test binary uses a subset
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod content_tree;
pub mod fake_control;
pub mod fake_store;
pub mod test_database;
pub mod test_config;

// Re-export commonly used items
pub use content_tree::ContentTree;
pub use fake_control::FakeServiceControl;
pub use fake_store::FakeStore;
pub use test_database::TestDatabase;
pub use test_config::*;
