//! Remote filesystem client tests.

#[cfg(unix)]
mod hadoop_cli_tests;
