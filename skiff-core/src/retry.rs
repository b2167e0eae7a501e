//! Blocking wrapper around resumable operations.

use tracing::trace;

use crate::error::SkiffError;

/// Call `op` until it stops returning `WouldBlock`.
///
/// `wait` runs between attempts; a real caller blocks on socket
/// readiness there. Any other result, success or failure, is returned
/// as-is.
///
/// ```
/// use skiff_core::{SkiffError, retry};
///
/// let mut attempts = 0;
/// let value = retry::block_on(
///     || {
///         attempts += 1;
///         if attempts < 3 { Err(SkiffError::WouldBlock) } else { Ok(attempts) }
///     },
///     || {},
/// );
/// assert_eq!(value.unwrap(), 3);
/// ```
pub fn block_on<R>(
    mut op: impl FnMut() -> Result<R, SkiffError>,
    mut wait: impl FnMut(),
) -> Result<R, SkiffError> {
    let mut retries = 0u32;
    loop {
        match op() {
            Err(e) if e.is_would_block() => {
                retries += 1;
                trace!(retries, "operation would block, waiting");
                wait();
            }
            other => return other,
        }
    }
}
