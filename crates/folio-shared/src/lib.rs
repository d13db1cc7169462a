//! # Folio Shared
//!
//! Wire types shared by the counter service and its HTTP clients.

pub mod response;

pub use response::ErrorResponse;
