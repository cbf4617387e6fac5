//! Core domain logic: the realtime AI session client and lead persistence.

pub mod leads;
pub mod realtime;

pub use leads::{CsvLeadSink, LeadRecord, LeadSink, LeadSinkError};
pub use realtime::*;
