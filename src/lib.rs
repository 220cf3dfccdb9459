//! Back office for countertop fabrication shops: stone inventory, cutting,
//! customers and deals, sales, payroll, scheduling and shop paperwork.

pub mod billing;
pub mod calendar;
pub mod checklists;
pub mod companies;
pub mod contacts;
pub mod core;
pub mod cutting;
pub mod drive;
pub mod email;
pub mod instructions;
pub mod inventory;
pub mod main_module;
pub mod payroll;
pub mod qbo;
pub mod sales;
pub mod security;
pub mod suppliers;
pub mod web;
