//! Azure Table Storage uplink for sensor devices.
//!
//! A blocking client that creates tables, inserts sensor readings and queries
//! rows over the table service's Atom+XML protocol, signing every request
//! with the account's shared key. Alongside the table client sits the clock
//! plumbing such devices need: an SNTP client, a daylight-saving rule engine
//! and a sync loop that disciplines an adjustable device clock so request
//! signatures stay within the service's clock-skew window.
//!
//! # Example
//!
//! ```no_run
//! use azure_table_uplink::{
//!     Account, EdmType, Property, ReqwestHttpSend, TableClient, TableEntity,
//! };
//!
//! fn main() -> azure_table_uplink::Result<()> {
//!     let account = Account::new("myaccount", "bXkgYmFzZTY0IGtleQ==", true);
//!     let mut client = TableClient::new(account, ReqwestHttpSend::new()?);
//!
//!     let status = client.create_table("AnalogValues")?;
//!     assert!(status.is_ok_or_exists());
//!
//!     let entity = TableEntity::new("D_2021", "2518389032")
//!         .with_property(Property::new("T_1", "23.5", EdmType::Double))
//!         .with_property(Property::new("SampleTime", "14:55:12", EdmType::String));
//!     client.insert_entity("AnalogValues", &entity)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod account;
mod atom;
mod clock;
mod dst;
mod entity;
mod error;
mod hash;
mod ntp;
mod sign;
mod table;
mod time;
mod timesync;
mod transport;

pub use account::Account;
pub use account::ServiceKind;
pub use atom::ParsedEntity;
pub use clock::DeviceClock;
pub use dst::DstRule;
pub use dst::DstSchedule;
pub use entity::EdmType;
pub use entity::EdmValue;
pub use entity::Property;
pub use entity::TableEntity;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
pub use ntp::NtpClient;
pub use ntp::NtpSample;
pub use ntp::StdUdpExchange;
pub use ntp::UdpExchange;
pub use sign::Authorization;
pub use sign::SigningScheme;
pub use table::OperationResult;
pub use table::OperationStatus;
pub use table::TableClient;
pub use timesync::SyncOutcome;
pub use timesync::TimeSync;
pub use timesync::TimeSyncEvent;
pub use timesync::TimeSyncSettings;
pub use timesync::TimeSyncStatus;
pub use transport::HttpSend;
pub use transport::ReqwestHttpSend;
