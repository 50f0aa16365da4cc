pub mod checkpoint;
pub mod file_lock;
pub mod id_alloc;
pub mod layout;
pub mod root;
pub mod store;
