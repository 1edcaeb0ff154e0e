//! Observational ports shared by the send and receive sides.

/// Direction of a dumped byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpDirection {
    /// Bytes leaving this endpoint.
    Outgoing,
    /// Bytes arriving at this endpoint.
    Incoming,
}

/// Diagnostic sink receiving raw wire bytes.
///
/// Purely observational: implementations must not influence the protocol
/// outcome, and errors inside a sink are the sink's own problem.
pub trait DumpSink: Send + Sync {
    /// Observe one raw message as it crosses the wire.
    fn dump(&self, direction: DumpDirection, content_type: &str, bytes: &[u8]);
}

/// A sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDumpSink;

impl DumpSink for NoopDumpSink {
    fn dump(&self, _direction: DumpDirection, _content_type: &str, _bytes: &[u8]) {}
}
