//! Ticket reference extraction.
//!
//! Decodes raw scanner text into a [`TicketReference`].

pub mod fields;
pub mod qr_payload;

pub use fields::*;
pub use qr_payload::*;
