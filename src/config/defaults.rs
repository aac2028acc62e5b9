//! Built-in baseline configuration and environment-tier overlays.

use super::types::Environment;
use serde_json::{Value, json};

/// Paths stripped from exported configuration.
pub const SENSITIVE_PATHS: &[&str] = &[
    "analytics.googleAnalyticsId",
    "analytics.gtmId",
    "analytics.plausibleDomain",
    "chatbot.apiKey",
    "chatbot.apiEndpoint",
    "contact.smtp",
];

/// The baseline tree served by `default` sources and used as the fallback
/// when every configured source fails. Contains no template expressions.
pub fn default_config() -> Value {
    json!({
        "personal": {
            "name": "Your Name",
            "title": "Software Engineer",
            "tagline": "Building reliable things for the web",
            "email": "hello@example.com",
            "location": "Earth",
            "bio": "A short introduction about who you are and what you do.",
            "avatar": "/images/avatar.png"
        },
        "social": {
            "github": "https://github.com/your-handle",
            "linkedin": "https://www.linkedin.com/in/your-handle"
        },
        "seo": {
            "title": "Your Name | Software Engineer",
            "description": "Portfolio of Your Name, software engineer.",
            "keywords": ["portfolio", "software engineer"],
            "siteUrl": "https://example.com",
            "ogImage": "/images/og.png"
        },
        "theme": {
            "primaryColor": "#2563eb",
            "secondaryColor": "#64748b",
            "accentColor": "#f59e0b",
            "mode": "system",
            "fontFamily": "Inter, sans-serif"
        },
        "features": {
            "blog": false,
            "chatbot": false,
            "contactForm": true,
            "analytics": false,
            "darkMode": true,
            "animations": true
        },
        "portfolio": {
            "title": "Selected Work",
            "projects": [
                {
                    "id": "sample-project",
                    "title": "Sample Project",
                    "description": "Replace this entry with a real project.",
                    "category": "Web",
                    "technologies": ["Rust", "TypeScript"],
                    "featured": true
                }
            ]
        },
        "experience": [
            {
                "id": "current-role",
                "company": "Example Corp",
                "position": "Software Engineer",
                "startDate": "2022-01",
                "current": true,
                "description": "Describe what you work on."
            }
        ],
        "education": [
            {
                "id": "degree",
                "institution": "Example University",
                "degree": "B.Sc. Computer Science",
                "startDate": "2016-09",
                "endDate": "2020-06",
                "current": false
            }
        ],
        "skills": [
            { "name": "Rust", "category": "Languages", "level": 80 },
            { "name": "TypeScript", "category": "Languages", "level": 75 },
            { "name": "PostgreSQL", "category": "Data", "level": 60 }
        ],
        "blog": {
            "enabled": false,
            "postsPerPage": 6,
            "showReadingTime": true
        },
        "contact": {
            "email": "hello@example.com",
            "successMessage": "Thanks for reaching out!"
        },
        "chatbot": {
            "enabled": false,
            "name": "Assistant",
            "greeting": "Hi! Ask me anything about this portfolio."
        },
        "analytics": {
            "provider": "none"
        },
        "deployment": {
            "target": "static"
        },
        "build": {
            "optimizeAssets": false,
            "generateSitemap": false,
            "cache": false,
            "outputDir": "dist"
        }
    })
}

/// Overlay applied directly above built-in defaults for the given tier.
pub fn tier_overlay(environment: Environment) -> Value {
    match environment {
        Environment::Development => json!({
            "build": { "optimizeAssets": false, "generateSitemap": false, "cache": false }
        }),
        Environment::Staging => json!({
            "build": { "optimizeAssets": true, "generateSitemap": true, "cache": true },
            "features": { "analytics": false }
        }),
        Environment::Production => json!({
            "build": { "optimizeAssets": true, "generateSitemap": true, "cache": true },
            "features": { "analytics": true }
        }),
        Environment::Test => json!({
            "build": { "optimizeAssets": false, "generateSitemap": false, "cache": false },
            "features": { "analytics": false }
        }),
    }
}

/// Starter document written by `generate`: the baseline plus example templates.
pub fn starter_document() -> Value {
    let mut doc = default_config();
    if let Some(seo) = doc.get_mut("seo").and_then(Value::as_object_mut) {
        seo.insert(
            "title".to_string(),
            json!("{{personal.name}} | {{personal.title}}"),
        );
        seo.insert(
            "description".to_string(),
            json!("Portfolio of {{personal.name}}, {{personal.title|lowercase}}."),
        );
    }
    if let Some(contact) = doc.get_mut("contact").and_then(Value::as_object_mut) {
        contact.insert("email".to_string(), json!("{{personal.email}}"));
        contact.insert(
            "successMessage".to_string(),
            json!("Thanks! {{personal.name|capitalize}} will reply soon."),
        );
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sections_present() {
        let config = default_config();
        for section in [
            "personal", "social", "seo", "theme", "features", "portfolio", "experience",
            "education", "skills", "blog", "contact", "chatbot", "analytics", "deployment",
            "build",
        ] {
            assert!(config.get(section).is_some(), "missing section {}", section);
        }
    }

    #[test]
    fn test_tier_overlays() {
        assert_eq!(
            tier_overlay(Environment::Development)["build"]["generateSitemap"],
            json!(false)
        );
        assert_eq!(tier_overlay(Environment::Staging)["build"]["generateSitemap"], json!(true));
        assert_eq!(tier_overlay(Environment::Staging)["features"]["analytics"], json!(false));
        assert_eq!(tier_overlay(Environment::Production)["features"]["analytics"], json!(true));
        assert_eq!(tier_overlay(Environment::Production)["build"]["cache"], json!(true));
    }

    #[test]
    fn test_starter_document_uses_templates() {
        let doc = starter_document();
        assert_eq!(doc["contact"]["email"], json!("{{personal.email}}"));
        assert!(
            doc["seo"]["title"]
                .as_str()
                .is_some_and(|title| title.contains("{{personal.name}}"))
        );
    }
}
