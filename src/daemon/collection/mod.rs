//! Everything that comes from the browser: the native messaging wire format, the messages carried
//! over it, and the dispatcher that applies them.

pub mod channel;
pub mod dispatcher;
pub mod framing;
pub mod signal;
