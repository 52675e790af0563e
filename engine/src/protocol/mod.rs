pub mod parser;

pub use parser::{parse_line, AnalysisLine};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed engine line ({reason}): {line}")]
    Malformed { reason: String, line: String },
    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
}
