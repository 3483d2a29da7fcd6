pub mod request;
pub mod service;
pub mod token;
