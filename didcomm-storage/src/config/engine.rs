use std::time::Duration;

use rst_common::standard::serde::{self, Deserialize};

use prople_didcomm_core::engine::types::{EngineOptions, DEFAULT_LISTENER_TIMEOUT_SECS};

use crate::common::types::{CommonError, ToValidate};

#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "self::serde")]
pub struct Engine {
    #[serde(default = "default_listener_timeout_secs")]
    pub(super) listener_timeout_secs: u64,
}

fn default_listener_timeout_secs() -> u64 {
    DEFAULT_LISTENER_TIMEOUT_SECS
}

impl Engine {
    pub fn get_listener_timeout(&self) -> Duration {
        Duration::from_secs(self.listener_timeout_secs)
    }

    pub fn to_options(&self) -> EngineOptions {
        EngineOptions::new(self.get_listener_timeout())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            listener_timeout_secs: default_listener_timeout_secs(),
        }
    }
}

impl ToValidate for Engine {
    fn validate(&self) -> Result<(), CommonError> {
        if self.listener_timeout_secs == 0 {
            return Err(CommonError::ValidationError(
                "config: engine:listener_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
