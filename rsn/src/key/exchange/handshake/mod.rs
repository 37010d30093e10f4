pub mod fourway;
pub mod group_key;
