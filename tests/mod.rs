//! Integration test modules for leapp-engine.
//!
//! This module organizes all integration tests that verify
//! end-to-end functionality of the evidence layer and the scheduler.

mod pipeline_tests;
