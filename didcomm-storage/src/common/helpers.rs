use super::types::{CommonError, ToValidate};

pub fn validate(validator: impl ToValidate) -> Result<(), CommonError> {
    validator.validate()
}

/// required fails with a `config: <section>:<key> is missing` validation error on an empty value
pub fn required(section: &str, key: &str, value: &str) -> Result<(), CommonError> {
    if value.trim().is_empty() {
        return Err(CommonError::ValidationError(format!(
            "config: {}:{} is missing",
            section, key
        )));
    }

    Ok(())
}

#[cfg(test)]
pub mod testdb {

    use once_cell::sync::OnceCell;
    use std::env;
    use std::path::PathBuf;

    use rstdev_storage::engine::rocksdb::executor::Executor;

    use crate::ConfigManager;
    use crate::DbBuilder;

    pub fn fixture_path(file: &str) -> String {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("src/config/fixtures");

        format!("{}/{}", path.display(), file)
    }

    pub fn global_db_builder() -> &'static Executor {
        static INSTANCE: OnceCell<Executor> = OnceCell::new();
        INSTANCE.get_or_init(|| {
            let config = ConfigManager::new(fixture_path("config.toml"))
                .parse()
                .unwrap();

            DbBuilder::new(config.db().protocol().to_owned())
                .build()
                .unwrap()
        })
    }
}
