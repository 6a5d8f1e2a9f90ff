//! Core functionality for the vigil project
//!
//! This crate contains the login risk evaluator and everything it depends on:
//!
//! - the domain records ([`LoginAttempt`], [`TrustedDevice`], [`SecurityAlert`])
//! - client signature classification ([`DeviceInfo`]) and location resolution ([`LocationResolver`])
//! - the risk scoring rules ([`RiskSignals`], [`RiskLevel`])
//! - the repository traits that storage backends implement ([`repositories`])
//! - the services that tie them together ([`services`])
//!
//! Storage backends such as `vigil-storage-sqlite` depend on this crate and implement
//! [`RepositoryProvider`]. Application code usually goes through the `vigil` facade instead.
pub mod alert;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod id;
pub mod location;
pub mod login;
pub mod repositories;
pub mod risk;
pub mod services;
pub mod user;
pub mod validation;

pub use alert::{AlertId, AlertType, NewSecurityAlert, SecurityAlert};
pub use config::{LoginRiskConfig, RiskWeights};
pub use device::{DeviceInfo, NewTrustedDevice, TrustLevel, TrustedDevice};
pub use error::Error;
pub use events::{Event, EventBus, EventHandler};
pub use location::{HashedLocationResolver, LocationResolver, StaticLocationResolver};
pub use login::{LockoutStatus, LoginAction, LoginAttempt, NewLoginAttempt, SessionId};
pub use repositories::RepositoryProvider;
pub use risk::{RiskAssessment, RiskLevel, RiskSignals};
pub use user::UserId;
