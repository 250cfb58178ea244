//! Template model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use herald_core::types::{ChannelType, TenantId};

/// A tenant-owned notification template for one `(name, channel)` pair.
///
/// Placeholders referenced in `subject`, `body` and `data` must be a subset
/// of the declared `placeholders` set; [`Template::undeclared_placeholders`]
/// reports violations and the admin surface rejects them. Unknown markers
/// encountered at render time are left verbatim, never a panic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Unique id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Template name; event handlers look templates up by event type.
    pub name: String,
    /// Target channel.
    pub channel: ChannelType,
    /// Optional subject line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Body text with `{name}` / `{{name}}` markers.
    pub body: String,
    /// Channel-specific structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Declared placeholder names.
    #[serde(default)]
    pub placeholders: Vec<String>,
    /// Monotonic version, bumped on every upsert.
    pub version: u32,
    /// Only active templates resolve.
    pub active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Template {
    /// Creates a new version-1 active template.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        channel: ChannelType,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            name: name.into(),
            channel,
            subject: None,
            body: body.into(),
            data: None,
            placeholders: Vec::new(),
            version: 1,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Sets the subject line.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the structured payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Declares the placeholder names.
    #[must_use]
    pub fn with_placeholders(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.placeholders = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns markers used in subject/body/data but not declared.
    #[must_use]
    pub fn undeclared_placeholders(&self) -> Vec<String> {
        let mut used = extract_markers(&self.body);
        if let Some(subject) = &self.subject {
            used.extend(extract_markers(subject));
        }
        if let Some(data) = &self.data {
            used.extend(extract_markers(&data.to_string()));
        }
        used.sort();
        used.dedup();
        used.into_iter()
            .filter(|name| !self.placeholders.iter().any(|p| p == name))
            .collect()
    }
}

/// Extracts `{name}` and `{{name}}` marker names from text.
fn extract_markers(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut names = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            let mut j = i;
            while j < chars.len() && chars[j] == '{' {
                j += 1;
            }
            let mut k = j;
            while k < chars.len() && (chars[k].is_alphanumeric() || chars[k] == '_' || chars[k] == '.')
            {
                k += 1;
            }
            if k > j && k < chars.len() && chars[k] == '}' {
                names.push(chars[j..k].iter().collect());
            }
            i = k.max(i + 1);
        } else {
            i += 1;
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_template_defaults() {
        let template = Template::new(
            TenantId::generate(),
            "user.registration.completed",
            ChannelType::Email,
            "Welcome {first_name}",
        );
        assert_eq!(template.version, 1);
        assert!(template.active);
        assert!(template.subject.is_none());
    }

    #[test]
    fn test_undeclared_placeholders_detected() {
        let template = Template::new(
            TenantId::generate(),
            "t",
            ChannelType::Email,
            "Hi {first_name}, code {{code}}",
        )
        .with_subject("Hello {first_name}")
        .with_placeholders(["first_name"]);

        assert_eq!(template.undeclared_placeholders(), vec!["code".to_string()]);
    }

    #[test]
    fn test_declared_placeholders_pass() {
        let template = Template::new(
            TenantId::generate(),
            "t",
            ChannelType::Sms,
            "Code: {{code}}",
        )
        .with_placeholders(["code"]);
        assert!(template.undeclared_placeholders().is_empty());
    }

    #[test]
    fn test_markers_in_data_payload() {
        let template = Template::new(TenantId::generate(), "t", ChannelType::Push, "body")
            .with_data(serde_json::json!({"url": "/tasks/{task_id}"}));
        assert_eq!(template.undeclared_placeholders(), vec!["task_id".to_string()]);
    }
}
