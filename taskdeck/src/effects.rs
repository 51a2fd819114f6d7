//! Best-effort side effects: the timer-expiry chime.
//!
//! A chime that cannot play is logged at debug level and otherwise
//! ignored; nothing here ever surfaces as an error to the user.

use std::io::Write;

/// Plays the timer-expiry sound.
///
/// Implementations must be cheap and non-blocking: `play` is called from
/// the app loop when a countdown reaches zero.
pub trait Chime: Send + Sync {
    /// Ring once. Failures are the implementation's problem to log.
    fn play(&self);
}

/// Rings the terminal bell by writing BEL to stdout.
pub struct TerminalBell;

impl Chime for TerminalBell {
    fn play(&self) {
        let mut stdout = std::io::stdout();
        if let Err(e) = stdout.write_all(b"\x07").and_then(|()| stdout.flush()) {
            tracing::debug!(error = %e, "could not ring the terminal bell");
        }
    }
}

/// Silent chime for tests and `--quiet`.
pub struct NullChime;

impl Chime for NullChime {
    fn play(&self) {}
}
