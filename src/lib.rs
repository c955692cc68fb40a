pub mod commands;
pub mod db;
pub mod finance;
pub mod models;
pub mod services;
pub mod utils;
