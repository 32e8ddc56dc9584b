use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder regex")
});

/// Values substituted into a template's `.env.template`
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub instance_name: String,
    pub container_name: String,
    pub subdomain: String,
    pub port: u16,
    pub base_domain: String,
}

impl RenderContext {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "INSTANCE_NAME" => Some(self.instance_name.clone()),
            "CONTAINER_NAME" => Some(self.container_name.clone()),
            "SUBDOMAIN" => Some(self.subdomain.clone()),
            "PORT" => Some(self.port.to_string()),
            "BASE_DOMAIN" => Some(self.base_domain.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEnv {
    pub content: String,
    /// Placeholders outside the known set, kept verbatim in `content`.
    pub unresolved: Vec<String>,
}

/// Substitute the known placeholders. Unknown `${NAME}` references are left
/// untouched so the mistake stays visible in the rendered file.
pub fn render_env(template: &str, ctx: &RenderContext) -> RenderedEnv {
    let mut unresolved = Vec::new();
    let content = PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures<'_>| match ctx.lookup(&caps[1]) {
            Some(value) => value,
            None => {
                if !unresolved.iter().any(|name| name == &caps[1]) {
                    unresolved.push(caps[1].to_string());
                }
                caps[0].to_string()
            }
        })
        .into_owned();

    if !unresolved.is_empty() {
        warn!(
            "Unresolved placeholders in env template for {}: {}",
            ctx.container_name,
            unresolved.join(", ")
        );
    }

    RenderedEnv { content, unresolved }
}
