// src/handlers/mod.rs

pub mod academic_year;
pub mod fee_structure;
pub mod general;
pub mod invoice;
pub mod late_fee_rule;
pub mod payment;
pub mod student;
