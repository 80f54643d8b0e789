use std::{collections::HashMap, sync::LazyLock};

use chrono::{Datelike, Local};
use parking_lot::RwLock;
use regex::{Captures, Regex};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::models::template::{EmailTemplate, RenderedTemplate};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid placeholder pattern"));

/// Replaces every `{{key}}` in `template` with the matching value from `data`.
///
/// Tokens without a usable value stay in the output untouched.
pub fn replace_variables(template: &str, data: &Map<String, JsonValue>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            data.get(&caps[1])
                .and_then(format_value)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// The string stored under `key`, or an empty string.
pub fn data_string(data: &Map<String, JsonValue>, key: &str) -> String {
    data.get(key)
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Falsy values (`null`, `""`, `0`, `false`) count as missing.
fn format_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null | JsonValue::Bool(false) => None,
        JsonValue::String(s) if s.is_empty() => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) if n.as_f64() == Some(0.0) => None,
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Named email templates, rendered on demand.
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, EmailTemplate>>,
}

impl TemplateRegistry {
    /// A registry preloaded with the `welcome`, `newsletter` and `passwordReset`
    /// templates.
    pub fn new() -> Self {
        let registry = Self::empty();
        for (name, template) in builtin_templates() {
            registry.add_template(name, template);
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_template(&self, name: impl Into<String>, template: EmailTemplate) {
        let name = name.into();
        debug!(template = %name, "Registering email template");
        self.templates.write().insert(name, template);
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    /// Renders `name` with `data` layered over the default company, recipient
    /// name, month and year.
    pub fn get_template(
        &self,
        name: &str,
        data: &Map<String, JsonValue>,
    ) -> Option<RenderedTemplate> {
        let mut merged = shared_defaults();
        merged.insert("name".to_string(), JsonValue::from("User"));
        merged.extend(data.clone());

        self.render(name, &merged)
    }

    /// Renders `name` for many recipients at once.
    ///
    /// Only the company, month and year defaults apply, so `{{name}}` and other
    /// recipient tokens survive unless `data` supplies them.
    pub fn get_shared_template(
        &self,
        name: &str,
        data: &Map<String, JsonValue>,
    ) -> Option<RenderedTemplate> {
        let mut merged = shared_defaults();
        merged.extend(data.clone());

        self.render(name, &merged)
    }

    fn render(&self, name: &str, data: &Map<String, JsonValue>) -> Option<RenderedTemplate> {
        let templates = self.templates.read();
        let template = templates.get(name)?;

        debug!(template = name, "Rendering email template");

        Some(RenderedTemplate {
            subject: replace_variables(&template.subject, data),
            text: replace_variables(&template.text, data),
            html: replace_variables(&template.html, data),
        })
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn shared_defaults() -> Map<String, JsonValue> {
    let now = Local::now();

    let mut defaults = Map::new();
    defaults.insert("company".to_string(), JsonValue::from("Your Company"));
    defaults.insert("month".to_string(), JsonValue::from(now.format("%B").to_string()));
    defaults.insert("year".to_string(), JsonValue::from(now.year()));
    defaults
}

fn builtin_templates() -> Vec<(&'static str, EmailTemplate)> {
    vec![
        (
            "welcome",
            EmailTemplate {
                subject: "Welcome to {{company}}!".to_string(),
                text: "Hi {{name}},\n\n\
                       Welcome to {{company}}! We're excited to have you on board.\n\n\
                       Best regards,\n\
                       The {{company}} Team"
                    .to_string(),
                html: r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #2563eb;">Welcome to {{company}}!</h1>
  <p>Hi {{name}},</p>
  <p>Welcome to {{company}}! We're excited to have you on board.</p>
  <p>Best regards,<br>The {{company}} Team</p>
</div>"#
                    .to_string(),
            },
        ),
        (
            "newsletter",
            EmailTemplate {
                subject: "{{company}} Newsletter - {{month}} {{year}}".to_string(),
                text: "Hi {{name}},\n\n\
                       Here's your {{company}} newsletter for {{month}} {{year}}.\n\n\
                       {{content}}\n\n\
                       Best regards,\n\
                       The {{company}} Team"
                    .to_string(),
                html: r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #2563eb;">{{company}} Newsletter</h1>
  <p>Hi {{name}},</p>
  <p>Here's your {{company}} newsletter for {{month}} {{year}}.</p>
  <div style="padding: 20px; background-color: #f8fafc; border-radius: 8px;">
    {{content}}
  </div>
  <p>Best regards,<br>The {{company}} Team</p>
</div>"#
                    .to_string(),
            },
        ),
        (
            "passwordReset",
            EmailTemplate {
                subject: "Password Reset Request".to_string(),
                text: "Hi {{name}},\n\n\
                       You requested a password reset. Click the link below to reset your password:\n\
                       {{resetLink}}\n\n\
                       This link expires in 1 hour.\n\n\
                       If you didn't request this, please ignore this email.\n\n\
                       Best regards,\n\
                       The {{company}} Team"
                    .to_string(),
                html: r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #dc2626;">Password Reset Request</h1>
  <p>Hi {{name}},</p>
  <p>You requested a password reset. Click the button below to reset your password:</p>
  <div style="text-align: center; margin: 30px 0;">
    <a href="{{resetLink}}" style="background-color: #2563eb; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; display: inline-block;">Reset Password</a>
  </div>
  <p><small>This link expires in 1 hour.</small></p>
  <p>If you didn't request this, please ignore this email.</p>
  <p>Best regards,<br>The {{company}} Team</p>
</div>"#
                    .to_string(),
            },
        ),
    ]
}
