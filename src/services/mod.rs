pub mod crypto;
pub mod receipt;
pub mod refresher;
pub mod repository;
pub mod rest;
pub mod state;
