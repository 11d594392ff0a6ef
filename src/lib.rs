//! # ota-dao
//!
//! Storage orchestration for an over-the-air update server. Tracks apps,
//! their deployments and release history, stores bundle content by hash,
//! and records client metrics and staged-rollout decisions.
//!
//! All persistence goes through a [`driver::Driver`]; two ship with the
//! crate, [`driver::SqliteDriver`] and [`driver::MemoryDriver`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ota_dao::config::StoreConfig;
//! use ota_dao::dao::DaoFactory;
//! use ota_dao::driver::SqliteDriver;
//! use ota_dao::types::{NewApp, NewDeployment, NewPackage};
//!
//! let driver = SqliteDriver::from_config(&StoreConfig::default())?;
//! let dao = DaoFactory::new(Arc::new(driver));
//! dao.init().await?;
//!
//! let mut app = NewApp { name: "MyApp".into(), ..Default::default() };
//! app.deployments.insert("Staging".into(), NewDeployment::generated());
//! let app = dao.create_app(app).await?;
//!
//! let staging = dao.deployment_by_app(&app.app.id, "Staging").await?.unwrap();
//! dao.add_package(&staging.deployment.key, NewPackage::new("v1", "abc")).await?;
//! ```

pub mod config;
pub mod dao;
pub mod driver;
pub mod error;
pub mod types;
