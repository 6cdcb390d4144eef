use parking_lot::RwLock;
use std::sync::Arc;
use tc_engine_core::{FlowError, TransactionRecord};
use tokio::sync::watch;

/// Owned by a mounted screen. Unmounting (explicitly or by drop) is observed
/// by every `ScreenToken` handed out.
pub struct ScreenGuard {
    tx: watch::Sender<bool>,
}

impl Default for ScreenGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenGuard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> ScreenToken {
        ScreenToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn unmount(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_unmounted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

#[derive(Clone)]
pub struct ScreenToken {
    rx: watch::Receiver<bool>,
}

impl ScreenToken {
    pub fn is_unmounted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the owning screen is gone.
    pub async fn unmounted(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|gone| *gone).await;
    }
}

#[derive(Debug, Clone)]
pub struct ViewState<T> {
    pub loading: bool,
    pub data: Option<T>,
    pub last_tx: Option<TransactionRecord>,
    pub last_error: Option<FlowError>,
    pub busy: bool,
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            loading: false,
            data: None,
            last_tx: None,
            last_error: None,
            busy: false,
        }
    }
}

/// Screen-owned state cell. Writes after unmount are dropped.
pub struct SharedView<T> {
    state: Arc<RwLock<ViewState<T>>>,
    token: ScreenToken,
}

impl<T> Clone for SharedView<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T: Clone> SharedView<T> {
    pub fn new(token: ScreenToken) -> Self {
        Self {
            state: Arc::new(RwLock::new(ViewState::default())),
            token,
        }
    }

    /// Applies `f` unless the screen is unmounted; returns whether it ran.
    pub fn update(&self, f: impl FnOnce(&mut ViewState<T>)) -> bool {
        if self.token.is_unmounted() {
            return false;
        }
        f(&mut self.state.write());
        true
    }

    pub fn snapshot(&self) -> ViewState<T> {
        self.state.read().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.state.read().data.clone()
    }

    pub fn token(&self) -> &ScreenToken {
        &self.token
    }
}
