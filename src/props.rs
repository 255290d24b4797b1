//! Per-request props for the rendered application.

use axum::http::Uri;
use serde_json::{Map, Value};

/// Props passed to `render` and embedded as `window.APP_PROPS`.
pub type Props = Map<String, Value>;

pub const DEFAULT_MESSAGE: &str = "Hello, World! from Rust.";

/// Produces the props for one request.
pub trait PropsProvider: Send + Sync {
    fn props(&self, uri: &Uri) -> Props;
}

impl<F> PropsProvider for F
where
    F: Fn(&Uri) -> Props + Send + Sync,
{
    fn props(&self, uri: &Uri) -> Props {
        self(uri)
    }
}

/// The same props for every request.
#[derive(Debug, Clone)]
pub struct StaticProps(Props);

impl StaticProps {
    /// `{"message": <message>}`
    pub fn message(message: impl Into<String>) -> Self {
        let mut props = Props::new();
        props.insert("message".to_string(), Value::String(message.into()));
        Self(props)
    }
}

impl Default for StaticProps {
    fn default() -> Self {
        Self::message(DEFAULT_MESSAGE)
    }
}

impl PropsProvider for StaticProps {
    fn props(&self, _uri: &Uri) -> Props {
        self.0.clone()
    }
}
