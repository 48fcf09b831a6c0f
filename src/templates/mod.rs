//! Template engine
//!
//! Page rendering with Tera.
//! Features:
//! - Templates loaded from a directory, or the set embedded in the binary
//! - Template hot-reload
//! - Standard template variables
//! - Fallback to an error page

use anyhow::{Context, Result};
use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

use crate::models::ConnectedUser;
use crate::services::theme::Theme;
use crate::services::toast::Toast;

mod error;

pub use error::TemplateError;

/// Templates compiled into the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Where the loaded templates came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Directory(PathBuf),
    Embedded,
}

/// Tera wrapper used by every page handler
pub struct TemplateEngine {
    tera: Tera,
    templates_path: PathBuf,
    source: TemplateSource,
}

impl TemplateEngine {
    /// Create an engine for `templates_path`.
    ///
    /// When the directory does not exist the embedded templates are used.
    pub fn new(templates_path: &Path) -> Result<Self> {
        let mut engine = Self {
            tera: Tera::default(),
            templates_path: templates_path.to_path_buf(),
            source: TemplateSource::Embedded,
        };
        engine.reload_templates()?;
        Ok(engine)
    }

    /// Engine over the embedded templates only
    pub fn embedded() -> Result<Self> {
        let tera = Self::build_tera(Self::collect_embedded())?;
        Ok(Self {
            tera,
            templates_path: PathBuf::new(),
            source: TemplateSource::Embedded,
        })
    }

    /// Re-read templates from their source
    pub fn reload_templates(&mut self) -> Result<()> {
        let (templates, source) = if self.templates_path.is_dir() {
            let mut templates = Vec::new();
            Self::collect_templates_from_dir(&self.templates_path, &self.templates_path, &mut templates)?;
            (templates, TemplateSource::Directory(self.templates_path.clone()))
        } else {
            tracing::info!(
                "Template directory {:?} not found, using embedded templates",
                self.templates_path
            );
            (Self::collect_embedded(), TemplateSource::Embedded)
        };

        if templates.is_empty() {
            return Err(TemplateError::NotFound(format!("{:?}", self.templates_path)).into());
        }

        self.tera = Self::build_tera(templates)?;
        self.source = source;
        tracing::debug!(count = self.tera.get_template_names().count(), "Templates loaded");
        Ok(())
    }

    fn build_tera(templates: Vec<(String, String)>) -> Result<Tera> {
        let mut tera = Tera::default();

        // Adding them in one batch lets Tera resolve `extends` in any order
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Render(format!("Failed to add templates: {}", describe(&e))))?;
        Ok(tera)
    }

    fn collect_embedded() -> Vec<(String, String)> {
        EmbeddedTemplates::iter()
            .filter_map(|name| {
                let file = EmbeddedTemplates::get(&name)?;
                let content = String::from_utf8_lossy(&file.data).into_owned();
                Some((name.into_owned(), content))
            })
            .collect()
    }

    /// Collect `*.html` files below `current_path`, named relative to `base_path`
    fn collect_templates_from_dir(
        base_path: &Path,
        current_path: &Path,
        templates: &mut Vec<(String, String)>,
    ) -> Result<()> {
        for entry in fs::read_dir(current_path).map_err(TemplateError::from)? {
            let path = entry.map_err(TemplateError::from)?.path();

            if path.is_dir() {
                Self::collect_templates_from_dir(base_path, &path, templates)?;
            } else if path.extension().is_some_and(|ext| ext == "html") {
                let relative_path = path
                    .strip_prefix(base_path)
                    .map_err(|_| TemplateError::Render("Failed to get relative path".to_string()))?;
                let template_name = relative_path.to_string_lossy().replace('\\', "/");
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read template: {:?}", path))?;
                templates.push((template_name, content));
            }
        }
        Ok(())
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }

    /// Render a template
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera
            .render(template, context)
            .map_err(|e| TemplateError::Render(format!("Failed to render '{}': {}", template, describe(&e))).into())
    }

    /// Render a template with standard variables automatically added
    pub fn render_with_standard_vars(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> Result<String> {
        let mut full_context = context.clone();
        standard_vars.insert_into(&mut full_context);
        self.render(template, &full_context)
    }

    /// Render a full page with standard variables, falling back like
    /// `render_with_fallback`
    pub fn render_page(&self, template: &str, context: &TeraContext, standard_vars: &StandardTemplateVars) -> String {
        let mut full_context = context.clone();
        standard_vars.insert_into(&mut full_context);
        self.render_with_fallback(template, &full_context)
    }

    /// Render a template, falling back to `error.html` and then to a plain
    /// built-in page. Never fails.
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to render template '{}': {}, trying error template", template, e);

                let mut error_context = context.clone();
                error_context.insert("error_title", "Something went wrong");
                error_context.insert("error_message", "This page could not be displayed.");
                error_context.insert("status", &500);

                match self.render("error.html", &error_context) {
                    Ok(html) => html,
                    Err(error_template_err) => {
                        tracing::error!(
                            "Failed to render error template: {}, returning plain error page",
                            error_template_err
                        );
                        simple_error_page("Something went wrong", "This page could not be displayed.")
                    }
                }
            }
        }
    }
}

/// Tera errors keep the useful part in their source chain
fn describe(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

/// Last-resort error page
pub fn simple_error_page(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 600px;
            margin: 50px auto;
            padding: 20px;
        }}
        h1 {{ color: #e74c3c; margin-top: 0; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <p>{message}</p>
    <p><a href="/">Back to the blog</a></p>
</body>
</html>"#,
        title = tera::escape_html(title),
        message = tera::escape_html(message),
    )
}

/// Link in the navbar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavLink {
    pub label: String,
    pub href: String,
    pub active: bool,
}

/// Variables every page gets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardTemplateVars {
    pub site_name: String,
    pub request_path: String,
    /// Current year (for copyright)
    pub year: i32,
    pub theme: Theme,
    pub current_user: Option<ConnectedUser>,
    pub authenticated: bool,
    pub toasts: Vec<Toast>,
    pub nav_links: Vec<NavLink>,
}

pub const SITE_NAME: &str = "Michael Kopp";

impl StandardTemplateVars {
    pub fn new(request_path: impl Into<String>, theme: Theme) -> Self {
        let request_path = request_path.into();
        let nav_links = [("Blog", "/blog")]
            .into_iter()
            .map(|(label, href)| NavLink {
                label: label.to_string(),
                href: href.to_string(),
                active: request_path == "/" || request_path.starts_with(href),
            })
            .collect();

        Self {
            site_name: SITE_NAME.to_string(),
            request_path,
            year: chrono::Utc::now().year(),
            theme,
            current_user: None,
            authenticated: false,
            toasts: Vec::new(),
            nav_links,
        }
    }

    pub fn with_user(mut self, user: Option<ConnectedUser>, authenticated: bool) -> Self {
        self.current_user = user;
        self.authenticated = authenticated;
        self
    }

    pub fn with_toasts(mut self, toasts: Vec<Toast>) -> Self {
        self.toasts = toasts;
        self
    }

    fn insert_into(&self, context: &mut TeraContext) {
        context.insert("site_name", &self.site_name);
        context.insert("request_path", &self.request_path);
        context.insert("year", &self.year);
        context.insert("theme", self.theme.as_str());
        context.insert("theme_is_dark", &self.theme.is_dark());
        context.insert("highlight_css", &self.theme.highlight_css_url());
        context.insert("authenticated", &self.authenticated);
        context.insert("toasts", &self.toasts);
        context.insert("nav_links", &self.nav_links);
        if let Some(ref user) = self.current_user {
            context.insert("current_user", user);
            context.insert("user_display_name", &user.display_name());
        }
    }
}

#[cfg(test)]
mod tests;
