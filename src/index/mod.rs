pub mod inverted;
pub mod kind;
pub mod sets;
pub mod value;
