mod cancel;
mod provider;

pub use cancel::CancellationToken;
pub use provider::{LockGuard, LockProvider};
