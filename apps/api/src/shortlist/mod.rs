pub mod handlers;
pub mod pool;
