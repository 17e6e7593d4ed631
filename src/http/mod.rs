pub mod exchange_client;
pub mod redirect;
pub mod response;
