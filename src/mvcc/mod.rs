pub mod controller;
pub mod write_set;
