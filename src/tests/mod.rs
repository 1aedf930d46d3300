#[cfg(test)]
pub mod monitor_tests;
