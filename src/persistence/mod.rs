pub mod backup;
pub mod manager;
