//! Report digest: classify report inventories and email owners what is pending.

pub mod config;
pub mod digest;
pub mod error;
pub mod mail;
pub mod pipeline;
pub mod report;
pub mod web;
