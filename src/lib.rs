pub mod clock;
pub mod cnpj;
pub mod config;
pub mod constants;
pub mod proxy;
