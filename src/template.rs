//! Message rendering.
//!
//! The `text` template is compiled once per configuration load into a
//! [`MessageTemplate`] and then rendered against every incoming
//! [`AlertBatch`]. Rendering is pure: the same template and batch always give
//! the same text.

use crate::alerts::AlertBatch;
use crate::error::RenderError;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

const TEMPLATE_NAME: &str = "matrix_text";

/// A compiled, reusable message template.
///
/// A key missing from a label or annotation map renders as empty text, so one
/// alert without an optional label still produces a message. Looking up an
/// attribute on something undefined (`alerts[9].labels`, `no_such.field`) is
/// an error. Use `| default(...)` to fill in optional values.
pub struct MessageTemplate {
    env: Environment<'static>,
    source: String,
}

impl MessageTemplate {
    /// Compiles `source`. Syntax errors are reported here, not at render time.
    pub fn compile(source: &str) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_keep_trailing_newline(true);
        env.add_template_owned(TEMPLATE_NAME, source.to_owned())?;
        Ok(Self {
            env,
            source: source.to_owned(),
        })
    }

    /// The source the template was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders the template against any serializable context.
    pub fn render_with<S: Serialize>(&self, context: &S) -> Result<String, RenderError> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        Ok(template.render(context)?)
    }
}

impl std::fmt::Debug for MessageTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageTemplate")
            .field("source", &self.source)
            .finish()
    }
}

/// Renders the outbound message text for one alert batch.
pub fn render(template: &MessageTemplate, batch: &AlertBatch) -> Result<String, RenderError> {
    tracing::trace!(alerts = batch.alerts.len(), "Rendering message");
    template.render_with(batch)
}
