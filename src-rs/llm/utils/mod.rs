pub mod busy_guard;
pub mod sse;
pub mod transport;
