//! Concurrency stress suites.

pub mod churn;
