//! Chrome DevTools Protocol client.
//!
//! Connects to a locally running Chromium over its remote-debugging
//! WebSocket, correlates command responses with pending calls, and forwards
//! every protocol event in arrival order to a single channel owned by the
//! caller. Routing events by session is the caller's business; this crate
//! never reorders or drops them.

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{probe, CdpClient};
pub use error::CdpError;
pub use protocol::{BrowserVersion, CdpEvent, CdpRequest, PageInfo, TargetInfo};
