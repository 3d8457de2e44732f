pub mod actor;
pub mod offer;
pub mod order;
pub mod request;
