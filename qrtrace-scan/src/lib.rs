//! qrtrace-scan library interface
//!
//! QR decode-and-verify flow for the traceability backend: image decoding,
//! live camera capture, payload normalization, and remote verification, tied
//! together per scan session. Exposed as a library for integration testing
//! and embedding; `main.rs` is the command-line front end.

pub mod auth_client;
pub mod camera;
pub mod capture;
pub mod decoder;
pub mod error;
pub mod http;
pub mod session;
pub mod settings;
pub mod verify;

pub use crate::error::{ScanError, ScanResult};

use std::sync::Arc;

use qrtrace_common::events::EventBus;
use qrtrace_common::AuthSession;

use crate::decoder::RqrrDecoder;
use crate::session::Scanner;
use crate::settings::ScanSettings;
use crate::verify::{VerificationClient, VerificationError};

/// Event bus capacity for a single interactive scanner
pub const EVENT_BUS_CAPACITY: usize = 64;

/// Build a scanner wired to the backend described by `settings`
///
/// The auth session, if any, is passed explicitly and only used for the
/// lookup requests of this scanner.
pub fn build_scanner(
    settings: &ScanSettings,
    auth: Option<AuthSession>,
    event_bus: EventBus,
) -> Result<Scanner, VerificationError> {
    let mut client = VerificationClient::new(
        settings.api_base_url.clone(),
        settings.lookup_path.clone(),
        settings.request_timeout,
    )?;
    if let Some(auth) = auth {
        client = client.with_auth(auth);
    }
    Ok(Scanner::new(
        Arc::new(client),
        Arc::new(RqrrDecoder::new()),
        event_bus,
    ))
}
