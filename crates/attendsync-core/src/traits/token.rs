//! Read-only access to the current access token.

/// Source of the current access token.
///
/// Real-time channels call [`TokenSource::current_token`] at every
/// connection attempt and never cache the result across an await.
pub trait TokenSource: Send + Sync + 'static {
    /// Returns the token to authenticate with right now, if any.
    fn current_token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn current_token(&self) -> Option<String> {
        self()
    }
}
