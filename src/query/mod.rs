pub mod criteria;
pub mod operator;
pub mod params;
pub mod planner;
pub mod types;
