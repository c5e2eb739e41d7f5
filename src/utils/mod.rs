mod retry;

pub use retry::{retry_on_transient, retry_with_backoff, IsTransient, RetryConfig, RetryResult};
