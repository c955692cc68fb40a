pub mod agents;
pub mod customers;
pub mod records;
pub mod settings;
pub mod staff;
pub mod trips;
