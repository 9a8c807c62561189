use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, ResolvedConfig};
use crate::error::CatalogError;

pub fn env_filter(log_level: &str) -> Result<EnvFilter, CatalogError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|err| CatalogError::ConfigParse(format!("log_level {log_level:?}: {err}"))),
    }
}

pub fn init(config: &ResolvedConfig) -> Result<(), CatalogError> {
    let filter = env_filter(&config.log_level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| CatalogError::ConfigParse(format!("logging: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparsable_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(env_filter("info").is_ok());
        assert!(env_filter("acq_catalog=loud").is_err());
    }
}
