//! Surfacing fatal configuration errors to the user

use tracing::error;

/// Shows a fatal message to the user
pub trait Presenter: Send + Sync {
    fn alert(&self, title: &str, message: &str);
}

/// Presenter that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn alert(&self, title: &str, message: &str) {
        error!(title, "{}", message);
    }
}
