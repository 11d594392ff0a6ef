#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use ota_dao::dao::DaoFactory;
use ota_dao::driver::{MemoryDriver, SqliteDriver};
use ota_dao::types::{CollaboratorRole, NewApp, NewDeployment};

mod interleaving;

#[allow(unused_imports)]
pub use interleaving::{InterleavingDriver, dao_over};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub async fn memory_dao() -> DaoFactory {
    init_tracing();
    let dao = DaoFactory::new(Arc::new(MemoryDriver::new()));
    dao.init().await.expect("init memory driver");
    dao
}

/// A DAO over a fresh SQLite file. Keep the returned directory alive for
/// the duration of the test.
pub async fn sqlite_dao() -> (DaoFactory, TempDir) {
    init_tracing();
    let temp = TempDir::new().expect("create temp dir");
    let driver = SqliteDriver::new(temp.path().join("ota.db")).expect("open sqlite");
    let dao = DaoFactory::new(Arc::new(driver));
    dao.init().await.expect("init sqlite driver");
    (dao, temp)
}

pub const OWNER: &str = "owner@example.com";

pub fn new_app(name: &str, deployments: &[(&str, &str)]) -> NewApp {
    let mut collaborators = BTreeMap::new();
    collaborators.insert(OWNER.to_string(), CollaboratorRole::Owner);

    NewApp {
        name: name.to_string(),
        deployments: deployments
            .iter()
            .map(|(name, key)| (name.to_string(), NewDeployment::new(*key)))
            .collect(),
        collaborators,
    }
}

/// Runs each listed `async fn(&DaoFactory)` against both drivers.
macro_rules! against_both_drivers {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $name() {
                    let dao = crate::common::memory_dao().await;
                    super::$name(&dao).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $name() {
                    let (dao, _temp) = crate::common::sqlite_dao().await;
                    super::$name(&dao).await;
                }
            )*
        }
    };
}

/// Runs each listed `async fn(&DaoFactory, &InterleavingDriver)` with the
/// wrapper over both drivers.
#[allow(unused_macros)]
macro_rules! against_both_interleaving_drivers {
    ($($name:ident),* $(,)?) => {
        mod interleaving_memory {
            $(
                #[tokio::test]
                async fn $name() {
                    let driver = crate::common::InterleavingDriver::memory();
                    let dao = crate::common::dao_over(&driver).await;
                    super::$name(&dao, &driver).await;
                }
            )*
        }

        mod interleaving_sqlite {
            $(
                #[tokio::test]
                async fn $name() {
                    let (driver, _temp) = crate::common::InterleavingDriver::sqlite();
                    let dao = crate::common::dao_over(&driver).await;
                    super::$name(&dao, &driver).await;
                }
            )*
        }
    };
}
