pub mod ecp;
pub mod http;
pub mod settings;
pub mod soap;
