use crate::domain::TrackedDomain;

pub const DEFAULT_FAVICON_TEMPLATE: &str = "https://{domain}/favicon.ico";

/// Resolves an icon reference for a domain when a site is first seen. The reference is stored
/// as-is and never fetched by the host, absence is a valid answer.
#[cfg_attr(test, mockall::automock)]
pub trait FaviconLookup: Send + Sync {
    fn favicon_for(&self, domain: &TrackedDomain) -> Option<String>;
}

/// Builds the reference by substituting `{domain}` in a URL template.
#[derive(Debug, Clone)]
pub struct DomainFavicon {
    template: String,
}

impl DomainFavicon {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Default for DomainFavicon {
    fn default() -> Self {
        Self::new(DEFAULT_FAVICON_TEMPLATE)
    }
}

impl FaviconLookup for DomainFavicon {
    fn favicon_for(&self, domain: &TrackedDomain) -> Option<String> {
        if self.template.is_empty() {
            return None;
        }
        Some(self.template.replace("{domain}", domain.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::TrackedDomain;

    use super::{DomainFavicon, FaviconLookup};

    #[test]
    fn test_default_template() {
        assert_eq!(
            DomainFavicon::default().favicon_for(&TrackedDomain::from("example.com")),
            Some("https://example.com/favicon.ico".to_string())
        );
    }

    #[test]
    fn test_custom_and_empty_template() {
        let domain = TrackedDomain::from("example.com");
        assert_eq!(
            DomainFavicon::new("https://icons.invalid/{domain}.png").favicon_for(&domain),
            Some("https://icons.invalid/example.com.png".to_string())
        );
        assert_eq!(DomainFavicon::new("").favicon_for(&domain), None);
    }
}
