//! Random access and write buffer tests

mod buffer_tests;
mod file_tests;
