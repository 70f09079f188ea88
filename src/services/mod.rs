// src/services/mod.rs

pub mod allocation;
pub mod calendar;
pub mod fees;
pub mod invoice;
pub mod latefee;
