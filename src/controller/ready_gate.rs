use tokio::sync::watch;

/// Single-fire readiness broadcast.
///
/// Waiters subscribed before or after [`ReadyGate::fire`] all observe it; the
/// gate never resets.
#[derive(Debug)]
pub struct ReadyGate {
    tx: watch::Sender<bool>,
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn waiter(&self) -> GateWaiter {
        GateWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug)]
pub struct GateWaiter {
    rx: watch::Receiver<bool>,
}

impl GateWaiter {
    /// Resolves to `true` once the gate fired, or `false` if the gate was
    /// dropped without firing.
    pub async fn wait(mut self) -> bool {
        self.rx.wait_for(|fired| *fired).await.is_ok()
    }
}
