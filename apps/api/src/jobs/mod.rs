pub mod filters;
pub mod form;
pub mod handlers;
pub mod queries;
