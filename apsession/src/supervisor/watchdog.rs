//! Boucle de surveillance du lecteur

use super::Inner;
use std::sync::Weak;

/// Vérifie périodiquement que le lecteur tourne et le relance sinon
///
/// La tâche se termine quand le superviseur est détruit ou désarmé.
pub(super) async fn run(inner: Weak<Inner>) {
    let grace = match inner.upgrade() {
        Some(inner) => inner.settings.grace_delay,
        None => return,
    };
    tokio::time::sleep(grace).await;

    loop {
        let Some(supervisor) = inner.upgrade() else {
            return;
        };

        let (armed, degraded, alive, generation) = {
            let mut state = supervisor.state.lock().await;
            let alive = state.is_alive();
            if state.consecutive_failures > 0
                && !state.degraded
                && state.survived(supervisor.settings.grace_delay)
            {
                tracing::debug!(
                    failures = state.consecutive_failures,
                    "Player healthy again, failure counter reset"
                );
                state.consecutive_failures = 0;
            }
            (state.armed, state.degraded, alive, state.generation)
        };
        if !armed {
            tracing::debug!("Watchdog stopping: supervisor disarmed");
            return;
        }

        if !alive && !degraded {
            match supervisor.restart_if_dead(generation).await {
                Ok(true) => tracing::info!(generation, "Watchdog restarted the player"),
                Ok(false) => {}
                // réessayé au prochain cycle
                Err(e) => tracing::warn!(generation, error = %e, "Watchdog restart failed"),
            }
        }

        let failures = supervisor.state.lock().await.consecutive_failures;
        let delay = supervisor.settings.backoff(failures);
        drop(supervisor);
        tokio::time::sleep(delay).await;
    }
}
