// src/models.rs

pub mod batch;
pub mod device;
pub mod metadata;
pub mod principal;
pub mod tenant;
