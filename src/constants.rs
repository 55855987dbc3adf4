pub const USER_AGENT: &str = concat!("cnpj-proxy/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_REGISTRY_URL: &str = "https://publica.cnpj.ws";

pub const SERVICE_NAME: &str = "cnpj-proxy";
