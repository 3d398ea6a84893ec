use minijinja::{context, AutoEscape, Environment};
use serde::Serialize;

use crate::{players::PlayersView, resource::ResourceRef, Result};

pub const PAGE_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const STYLESHEET_CONTENT_TYPE: &str = "text/css";

/// Renders one template resource to a response body.
///
/// The template source is fetched from its [`ResourceRef`] on every call,
/// nothing is cached between renders.
#[derive(Clone, Debug)]
pub struct Renderer {
    resource: ResourceRef,
    content_type: &'static str,
    escape_html: bool,
}

impl Renderer {
    /// Escaping is fixed by `escape_html`, whatever the resource is named.
    pub fn new(resource: ResourceRef, content_type: &'static str, escape_html: bool) -> Renderer {
        Renderer {
            resource,
            content_type,
            escape_html,
        }
    }

    pub fn page(resource: ResourceRef) -> Renderer {
        Self::new(resource, PAGE_CONTENT_TYPE, true)
    }

    pub fn stylesheet(resource: ResourceRef) -> Renderer {
        Self::new(resource, STYLESHEET_CONTENT_TYPE, false)
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String> {
        let name = self.resource.name();
        let source = self.resource.read()?;
        let mut env = Environment::new();
        let escape = if self.escape_html {
            AutoEscape::Html
        } else {
            AutoEscape::None
        };
        env.set_auto_escape_callback(move |_| escape);
        let tmpl = env.template_from_named_str(&name, &source)?;
        Ok(tmpl.render(ctx)?)
    }

    pub fn render_players(&self, players: &PlayersView) -> Result<String> {
        self.render(context! { players => players })
    }

    pub fn render_empty(&self) -> Result<String> {
        self.render(context! {})
    }
}
