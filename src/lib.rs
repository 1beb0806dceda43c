#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[macro_use]
mod fmt;

pub mod config;
pub mod connect;
pub mod dynamic;
pub mod error;
mod fixed;
mod flag;
mod manager;
pub mod platform;
pub mod portal;
pub mod record;
pub mod storage;
mod store;

pub use config::ProvisioningConfig;
pub use connect::{CloudLink, ConnectStatus, WifiStation};
pub use dynamic::{DynamicField, DynamicFields};
pub use error::Error;
pub use fixed::FixedStr;
pub use flag::PortalFlag;
pub use manager::{BootDecision, PortalReason, ProvisioningManager, State, decide_boot};
pub use portal::{PortalRequest, PortalResponse, PortalSession};
pub use record::{CloudCredential, ConfigRecord, WifiCredential};
pub use store::{RecordStatus, RecordStore, Restored};
