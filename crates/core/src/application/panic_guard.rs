// Panic isolation for handlers and protected work
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::port::HandlerError;

/// Payload of a caught panic
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Poll `future` to completion, catching a panic instead of unwinding through the caller
pub async fn catch_panic<F>(future: F) -> Result<F::Output, PanicPayload>
where
    F: Future,
{
    AssertUnwindSafe(future).catch_unwind().await
}

/// Run a handler future; a panic becomes [`HandlerError::Panicked`]
pub async fn guard_handler<F>(future: F) -> Result<(), HandlerError>
where
    F: Future<Output = Result<(), HandlerError>>,
{
    match catch_panic(future).await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
