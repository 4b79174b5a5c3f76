//! DNS request tracking
//!
//! Outbound queries for names in the name table are remembered under their
//! 4-tuple and transaction id, so responses and later lookups can be
//! attributed to the query that caused them.

pub mod correlator;
pub mod name;
pub mod programs;

pub use correlator::{request_key, DnsCorrelator};
pub use name::{from_dotted, parse_question, presentation_len, to_dotted, wire_len, DnsQuestion};
pub use programs::{allow_list, DnsEvalContext, DnsProgram, DnsProgramTable};
