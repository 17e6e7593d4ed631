use anyhow::{anyhow, Result};
use log::debug;
use quick_xml::escape::escape;
use std::fs;
use std::path::Path;

const ENVELOPE: &str = include_str!("templates/envelope.xml");
const FAULT: &str = include_str!("templates/fault.xml");
const SECURITY: &str = include_str!("templates/security.xml");
const USERNAME_TOKEN: &str = include_str!("templates/username_token.xml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Envelope,
    Fault,
    Security,
    UsernameToken,
}

impl Template {
    fn file_name(&self) -> &'static str {
        match self {
            Template::Envelope => "envelope.xml",
            Template::Fault => "fault.xml",
            Template::Security => "security.xml",
            Template::UsernameToken => "username_token.xml",
        }
    }
}

/// A value substituted for a `${name}` placeholder.
#[derive(Debug, Clone, Copy)]
pub enum Fill<'a> {
    /// Character data, escaped on insertion.
    Text(&'a str),
    /// An already serialized XML fragment, inserted as is.
    Markup(&'a str),
}

/// Renders the four envelope templates used during a handshake.
///
/// Template text is read once when the renderer is built and never changes afterwards.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    envelope: String,
    fault: String,
    security: String,
    username_token: String,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        TemplateRenderer::new()
    }
}

impl TemplateRenderer {
    /// Builds a renderer from the templates compiled into the crate.
    pub fn new() -> TemplateRenderer {
        TemplateRenderer {
            envelope: ENVELOPE.trim().to_string(),
            fault: FAULT.trim().to_string(),
            security: SECURITY.trim().to_string(),
            username_token: USERNAME_TOKEN.trim().to_string(),
        }
    }

    /// Builds a renderer from a directory of template files.
    ///
    /// Files missing from the directory fall back to the built-in template.
    pub fn from_dir(dir: &Path) -> Result<TemplateRenderer> {
        if !dir.is_dir() {
            return Err(anyhow!("template directory {} does not exist", dir.display()));
        }

        let mut renderer = TemplateRenderer::new();
        for template in [
            Template::Envelope,
            Template::Fault,
            Template::Security,
            Template::UsernameToken,
        ] {
            let path = dir.join(template.file_name());
            if path.is_file() {
                debug!("loading {:?} template from {}", template, path.display());
                let contents = fs::read_to_string(&path)?;
                *renderer.slot(template) = contents.trim().to_string();
            }
        }

        Ok(renderer)
    }

    fn slot(&mut self, template: Template) -> &mut String {
        match template {
            Template::Envelope => &mut self.envelope,
            Template::Fault => &mut self.fault,
            Template::Security => &mut self.security,
            Template::UsernameToken => &mut self.username_token,
        }
    }

    fn source(&self, template: Template) -> &str {
        match template {
            Template::Envelope => &self.envelope,
            Template::Fault => &self.fault,
            Template::Security => &self.security,
            Template::UsernameToken => &self.username_token,
        }
    }

    /// Substitutes every `${name}` placeholder of `template`.
    ///
    /// Placeholders without a value render as an empty string.
    pub fn render(&self, template: Template, values: &[(&str, Fill)]) -> String {
        let source = self.source(template);
        let mut out = String::with_capacity(source.len());
        let mut rest = source;

        while let Some(start) = rest.find("${") {
            let Some(length) = rest[start + 2..].find('}') else {
                break;
            };
            out.push_str(&rest[..start]);

            let name = &rest[start + 2..start + 2 + length];
            match values.iter().find(|(key, _)| *key == name) {
                Some((_, Fill::Text(value))) => out.push_str(&escape(value)),
                Some((_, Fill::Markup(value))) => out.push_str(value),
                None => debug!("no value for placeholder {} in {:?}", name, template),
            }

            rest = &rest[start + 2 + length + 1..];
        }
        out.push_str(rest);

        out
    }

    pub fn envelope(&self, header: &str, body: &str) -> String {
        self.render(
            Template::Envelope,
            &[("header", Fill::Markup(header)), ("body", Fill::Markup(body))],
        )
    }

    pub fn fault(&self, code: &str, message: &str) -> String {
        self.render(
            Template::Fault,
            &[("code", Fill::Text(code)), ("message", Fill::Text(message))],
        )
    }

    pub fn security(&self, token: &str) -> String {
        self.render(Template::Security, &[("token", Fill::Markup(token))])
    }

    pub fn username_token(&self, username: &str, password: &str) -> String {
        self.render(
            Template::UsernameToken,
            &[
                ("username", Fill::Text(username)),
                ("password", Fill::Text(password)),
            ],
        )
    }
}
