// src/services.rs

pub mod admin_service;
pub mod batch_service;
pub mod device_service;
pub mod email;
pub mod identity;
