use std::io;

use ecomat_server::{AdvisorConfig, AdvisorServer, DEFAULT_HTTP_ADDR};

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = std::env::var("ECOMAT_HTTP_ADDR").unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());
    let config = AdvisorConfig::from_env();
    let server = AdvisorServer::from_config(config).map_err(|err| {
        log::error!("failed to load material dataset: {err}");
        io::Error::other(err)
    })?;
    server.serve_http(&addr)
}
