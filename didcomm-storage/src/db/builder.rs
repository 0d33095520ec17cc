use rst_common::with_logging::log::debug;

use rstdev_storage::engine::rocksdb::db::DB;
use rstdev_storage::engine::rocksdb::executor::Executor;
use rstdev_storage::engine::rocksdb::options::Options;

use crate::common::helpers;
use crate::common::types::CommonError;
use crate::config::Protocol;

use super::merge_operators::{merge_index, MERGE_INDEX_ID};

/// `Builder` opens the protocol column family with the index merge operator registered
pub struct Builder {
    protocol: Protocol,
}

impl Builder {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn build(&self) -> Result<Executor, CommonError> {
        helpers::validate(self.protocol.clone())?;

        let common = self.protocol.common();
        let opts = self.protocol.options().to_owned();
        let cf_name = common.cf_name().to_string();

        debug!("[storage:db] open {} cf: {}", common.path(), cf_name);

        let mut db_opts = Options::new(common.path().to_string(), cf_name.clone());
        db_opts
            .build_default_opts()
            .set_db_opts(move |opt| {
                opt.create_if_missing(opts.create_if_missing());
                opt.create_missing_column_families(opts.create_missing_columns());
                opt.set_error_if_exists(opts.error_if_exists());
                opt.set_wal_dir(opts.wal_dir());

                opt
            })
            .set_cf_opts(|opt| {
                opt.set_merge_operator_associative(MERGE_INDEX_ID, merge_index);

                opt
            });

        let mut db = DB::new(db_opts).map_err(|err| CommonError::DbError(err.to_string()))?;
        let instance = db
            .build()
            .map_err(|err| CommonError::DbError(err.to_string()))?;

        db.set_db(instance);
        Ok(Executor::new(db, cf_name))
    }
}
