//! Backend tests.

mod hdfs_tests;
mod memory_tests;
