use rst_common::standard::serde::{self, Deserialize};

use crate::common::helpers::required;
use crate::common::types::{CommonError, ToValidate};

/// Location of the RocksDB database and the column family the engine writes to
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(crate = "self::serde")]
pub struct RocksDBCommon {
    pub(super) path: String,
    pub(super) cf_name: String,
}

impl RocksDBCommon {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cf_name(&self) -> &str {
        &self.cf_name
    }
}

impl ToValidate for RocksDBCommon {
    fn validate(&self) -> Result<(), CommonError> {
        required("rocksdbcommon", "path", &self.path)?;
        required("rocksdbcommon", "cf_name", &self.cf_name)
    }
}

fn enabled() -> bool {
    true
}

/// Open options of the database, the flags default to creating whatever is missing
#[derive(Deserialize, Clone, Debug)]
#[serde(crate = "self::serde")]
pub struct RocksDBOptions {
    #[serde(default = "enabled")]
    pub(super) create_if_missing: bool,

    #[serde(default = "enabled")]
    pub(super) create_missing_columns: bool,

    #[serde(default)]
    pub(super) set_error_if_exists: bool,

    #[serde(default)]
    pub(super) set_wal_dir: String,
}

impl RocksDBOptions {
    pub fn create_if_missing(&self) -> bool {
        self.create_if_missing
    }

    pub fn create_missing_columns(&self) -> bool {
        self.create_missing_columns
    }

    pub fn error_if_exists(&self) -> bool {
        self.set_error_if_exists
    }

    pub fn wal_dir(&self) -> &str {
        &self.set_wal_dir
    }
}

impl Default for RocksDBOptions {
    fn default() -> Self {
        Self {
            create_if_missing: enabled(),
            create_missing_columns: enabled(),
            set_error_if_exists: false,
            set_wal_dir: String::new(),
        }
    }
}

impl ToValidate for RocksDBOptions {
    fn validate(&self) -> Result<(), CommonError> {
        required("rocksdboptions", "wal_dir", &self.set_wal_dir)
    }
}

/// `Protocol` is the column family holding pending actions, instances and their indexes
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(crate = "self::serde")]
pub struct Protocol {
    pub(super) common: RocksDBCommon,
    pub(super) db: RocksDBOptions,
}

impl Protocol {
    pub fn common(&self) -> &RocksDBCommon {
        &self.common
    }

    pub fn options(&self) -> &RocksDBOptions {
        &self.db
    }
}

impl ToValidate for Protocol {
    fn validate(&self) -> Result<(), CommonError> {
        self.common.validate()?;
        self.db.validate()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(crate = "self::serde")]
pub struct Database {
    pub(super) protocol: Protocol,
}

impl Database {
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }
}

impl ToValidate for Database {
    fn validate(&self) -> Result<(), CommonError> {
        self.protocol.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;

    use rstdev_config::format::use_toml;
    use rstdev_config::parser::from_file;
    use rstdev_config::{types::ConfigError, Builder};
    use table_test::table_test;

    use crate::common::helpers;

    fn generate_protocol(path: &str, cf_name: &str, wal_dir: &str) -> Protocol {
        Protocol {
            common: RocksDBCommon {
                path: path.to_string(),
                cf_name: cf_name.to_string(),
            },
            db: RocksDBOptions {
                set_wal_dir: wal_dir.to_string(),
                ..RocksDBOptions::default()
            },
        }
    }

    #[test]
    fn test_parse_database_config() -> Result<(), ConfigError> {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("src/config/fixtures");

        let toml_file = format!("{}/config_db.toml", path.display());
        let config_db: Database = Builder::new(from_file(toml_file)).fetch()?.parse(use_toml)?;

        let protocol = config_db.protocol();
        assert_eq!(protocol.common().cf_name(), "protocol-cf");
        assert_eq!(protocol.common().path(), "./protocol-storage");
        assert_eq!(protocol.options().wal_dir(), "./protocol-db-wal");

        assert!(protocol.options().create_if_missing());
        assert!(protocol.options().create_missing_columns());
        assert!(protocol.options().error_if_exists());
        assert!(helpers::validate(config_db).is_ok());
        Ok(())
    }

    #[test]
    fn test_default_options() {
        let opts = RocksDBOptions::default();
        assert!(opts.create_if_missing());
        assert!(opts.create_missing_columns());
        assert!(!opts.error_if_exists());
        assert!(opts.wal_dir().is_empty());
    }

    #[test]
    fn test_protocol_validation() {
        let table = vec![
            (("", "protocol-cf", "./wal"), Some("rocksdbcommon:path")),
            (("./db", "", "./wal"), Some("rocksdbcommon:cf_name")),
            (("./db", "protocol-cf", ""), Some("rocksdboptions:wal_dir")),
            (("./db", "protocol-cf", "./wal"), None),
        ];

        for (validator, (path, cf_name, wal_dir), expected) in table_test!(table) {
            let validation = helpers::validate(generate_protocol(path, cf_name, wal_dir));
            let missing_key = validation.err().map(|err| match err {
                CommonError::ValidationError(msg) => msg,
                other => other.to_string(),
            });

            validator
                .given(&format!("{} {} {}", path, cf_name, wal_dir))
                .when("validate protocol section")
                .then("it should name the missing key")
                .assert_eq(
                    expected.map(|key: &str| format!("config: {} is missing", key)),
                    missing_key,
                );
        }
    }

    #[test]
    fn test_database_default_validation_failed() {
        let validation = helpers::validate(Database::default());
        assert!(matches!(
            validation,
            Err(CommonError::ValidationError(msg)) if msg.contains("rocksdbcommon:path")
        ));
    }
}
