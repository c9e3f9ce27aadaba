//! Handlebars rendering with HTML escaping disabled, since output is
//! manifest text.
//!
//! Helpers:
//! - default: first param unless null/missing, else the second

use handlebars::{Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext};
use serde_json::Value;

use crate::templates::TemplatesFile;
use crate::RenderError;

/// Compiled renderer with registered helpers
pub struct TemplateRenderer<'a> {
    handlebars: Handlebars<'a>,
}

impl<'a> TemplateRenderer<'a> {
    /// Register every template of `templates`; a template that does not
    /// compile is an error.
    pub fn new(templates: &TemplatesFile) -> Result<Self, RenderError> {
        let mut handlebars = Handlebars::new();

        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("default", Box::new(DefaultHelper));

        for (name, template) in &templates.templates {
            handlebars
                .register_template_string(name, &template.template)
                .map_err(|e| RenderError::Template(format!("{}: {}", name, e)))?;
        }

        Ok(TemplateRenderer { handlebars })
    }

    pub fn builtin() -> Result<Self, RenderError> {
        Self::new(&TemplatesFile::builtin()?)
    }

    /// Render a named template with data
    pub fn render(&self, template_name: &str, data: &Value) -> Result<String, RenderError> {
        if !self.handlebars.has_template(template_name) {
            return Err(RenderError::Render(format!("unknown template `{}`", template_name)));
        }
        self.handlebars
            .render(template_name, data)
            .map_err(|e| RenderError::Render(e.to_string()))
    }
}

/// Default value helper
struct DefaultHelper;

impl HelperDef for DefaultHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = h.param(0).map(|v| v.value());
        let default = h.param(1).map(|v| v.value());

        let chosen = match value {
            Some(v) if !v.is_null() => Some(v),
            _ => default.filter(|d| !d.is_null()),
        };

        if let Some(v) = chosen {
            match v.as_str() {
                Some(s) => out.write(s)?,
                None => out.write(&v.to_string())?,
            }
        }

        Ok(())
    }
}
