//! Service layer for business logic
//!
//! Services are generic over the repository traits and hold them behind `Arc`s.

pub mod alert;
pub mod device;
pub mod login_risk;

pub use alert::SecurityAlertService;
pub use device::TrustedDeviceService;
pub use login_risk::{Clock, FailedLoginOutcome, LoginRiskService};
