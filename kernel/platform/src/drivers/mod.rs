//! Driver implementations satisfying the platform init contract

pub mod gic400;
