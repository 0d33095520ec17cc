use rstdev_config::format::use_toml;
use rstdev_config::parser::from_file;
use rstdev_config::{types::ConfigError, Builder};

use crate::common::helpers;
use crate::common::types::CommonError;

use super::Config;

/// `Parser` loads a TOML config file and only hands out configs that passed validation
pub struct Parser {
    conf_file: String,
}

impl Parser {
    pub fn new(conf_file: String) -> Self {
        Self { conf_file }
    }

    pub fn parse(&self) -> Result<Config, CommonError> {
        let config = self
            .load()
            .map_err(|err| CommonError::ConfigError(format!("{}: {:?}", self.conf_file, err)))?;

        helpers::validate(config.clone())?;
        Ok(config)
    }

    fn load(&self) -> Result<Config, ConfigError> {
        Builder::new(from_file(self.conf_file.to_owned()))
            .fetch()?
            .parse(use_toml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::common::helpers::testdb::fixture_path;

    #[test]
    fn test_parse_config() {
        let config = Parser::new(fixture_path("config.toml")).parse();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(
            config.engine().get_listener_timeout(),
            Duration::from_secs(5)
        );

        let protocol = config.db().protocol();
        assert_eq!(protocol.common().path(), "./protocol-storage");
        assert_eq!(protocol.common().cf_name(), "protocol-cf");
        assert_eq!(protocol.options().wal_dir(), "./protocol-db-wal");
        assert!(protocol.options().create_if_missing());
        assert!(protocol.options().create_missing_columns());
        assert!(!protocol.options().error_if_exists());
    }

    #[test]
    fn test_parse_missing_file() {
        let config = Parser::new(fixture_path("not-exists.toml")).parse();
        assert!(matches!(config, Err(CommonError::ConfigError(_))));
    }

    #[test]
    fn test_parse_rejects_invalid_config() {
        let config = Parser::new(fixture_path("config_missing_cf.toml")).parse();
        assert!(matches!(
            config,
            Err(CommonError::ValidationError(msg)) if msg.contains("rocksdbcommon:cf_name")
        ));
    }
}
