//! Cross-module test suites
//!
//! Per-module behaviour is covered next to each module; these suites drive
//! several providers through one shared context.

mod property_tests;
