pub mod gateway;
pub mod resolver;
pub mod search;
