pub mod export;
pub mod gateway;
pub mod google_link;
pub mod http_gateway;
pub mod mock;
pub mod session;
pub mod status;
pub mod store;
