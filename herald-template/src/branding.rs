//! Tenant-branded HTML shell for the email channel.

use herald_core::types::TenantBranding;

/// Embeds a rendered plaintext body into the branded HTML email shell.
///
/// Newlines in the body become `<br>` tags; the header carries the tenant
/// logo and name, the footer the about text.
#[must_use]
pub fn wrap_email_html(subject: &str, body: &str, branding: &TenantBranding) -> String {
    let logo_html = branding.logo_url.as_ref().map_or_else(String::new, |url| {
        format!(
            r#"<img src="{url}" alt="{} logo" style="max-width: 200px; height: auto;">"#,
            branding.name
        )
    });

    let about_html = if branding.about.is_empty() {
        String::new()
    } else {
        format!("<p>{}</p>", branding.about)
    };

    let body_html = body.trim().replace('\n', "<br>");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{subject}</title>
<style>
body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; background-color: #f4f4f4; }}
.email-container {{ background-color: white; margin: 20px; padding: 30px; border-radius: 10px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
.header {{ text-align: center; padding-bottom: 30px; border-bottom: 3px solid {primary}; }}
.content {{ padding: 20px 0; }}
.footer {{ margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee; text-align: center; color: #666; font-size: 12px; }}
.button {{ display: inline-block; padding: 12px 24px; background-color: {primary}; color: white; text-decoration: none; border-radius: 5px; margin: 10px 0; }}
.button:hover {{ background-color: {secondary}; color: #333; }}
</style>
</head>
<body>
<div class="email-container">
<div class="header">
{logo_html}
<h1 style="color: {primary}; margin: 20px 0 0 0;">{name}</h1>
</div>
<div class="content">
{body_html}
</div>
<div class="footer">
<p>This email was sent by {name}</p>
{about_html}
</div>
</div>
</body>
</html>"#,
        primary = branding.primary_color,
        secondary = branding.secondary_color,
        name = branding.name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::TenantId;

    fn test_branding() -> TenantBranding {
        TenantBranding {
            name: "Acme".to_string(),
            logo_url: Some("https://acme.test/logo.png".to_string()),
            primary_color: "#FF0000".to_string(),
            secondary_color: "#FADBD8".to_string(),
            email_from: None,
            about: "We make everything.".to_string(),
        }
    }

    #[test]
    fn test_wrapper_embeds_branding() {
        let html = wrap_email_html("Welcome", "Hi John", &test_branding());
        assert!(html.contains("#FF0000"));
        assert!(html.contains("#FADBD8"));
        assert!(html.contains("Acme"));
        assert!(html.contains("https://acme.test/logo.png"));
        assert!(html.contains("We make everything."));
        assert!(html.contains("Hi John"));
    }

    #[test]
    fn test_newlines_become_breaks() {
        let html = wrap_email_html("s", "line one\nline two", &test_branding());
        assert!(html.contains("line one<br>line two"));
    }

    #[test]
    fn test_missing_logo_omits_img_tag() {
        let mut branding = test_branding();
        branding.logo_url = None;
        let html = wrap_email_html("s", "b", &branding);
        assert!(!html.contains("<img"));
    }

    #[test]
    fn test_fallback_branding_renders() {
        let tenant = TenantId::new("abcdef01-2345-6789-abcd-ef0123456789");
        let branding = TenantBranding::fallback(&tenant);
        let html = wrap_email_html("s", "b", &branding);
        assert!(html.contains("Tenant abcdef01"));
    }
}
