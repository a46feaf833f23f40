mod html_audit_sink;

pub use html_audit_sink::*;
