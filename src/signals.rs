use std::sync::OnceLock;

use tokio::sync::watch;

/// Exit codes mandated for signal-driven termination.
pub const SIGINT_EXIT: i32 = 130;
pub const SIGTERM_EXIT: i32 = 143;

fn channel() -> &'static watch::Sender<Option<i32>> {
    static TX: OnceLock<watch::Sender<Option<i32>>> = OnceLock::new();
    TX.get_or_init(|| watch::channel(None).0)
}

/// Install the SIGINT/SIGTERM listener. Handlers only record the pending
/// exit code; the engines observe it at their own safe points so in-flight
/// CLI calls are allowed to finish.
pub fn install() {
    #[cfg(unix)]
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (Ok(mut interrupt), Ok(mut terminate)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            tracing::warn!("could not install signal handlers");
            return;
        };

        let code = tokio::select! {
            _ = interrupt.recv() => SIGINT_EXIT,
            _ = terminate.recv() => SIGTERM_EXIT,
        };
        tracing::warn!(code, "Signal received, finishing in-flight work");
        let _ = channel().send_replace(Some(code));
    });
}

/// The pending exit code, if a signal has arrived.
pub fn interrupted() -> Option<i32> {
    *channel().borrow()
}

/// Wait until a signal arrives and return its exit code.
pub async fn wait() -> i32 {
    let mut rx = channel().subscribe();
    loop {
        if let Some(code) = *rx.borrow() {
            return code;
        }
        if rx.changed().await.is_err() {
            // Sender is static; this only happens in teardown.
            std::future::pending::<()>().await;
        }
    }
}

/// Force a pending exit code. Test hook for the engines' cancellation paths.
#[doc(hidden)]
pub fn trigger(code: i32) {
    let _ = channel().send_replace(Some(code));
}

/// Clear any pending exit code. Test hook.
#[doc(hidden)]
pub fn reset() {
    let _ = channel().send_replace(None);
}
