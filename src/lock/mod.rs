pub mod page_lock;
