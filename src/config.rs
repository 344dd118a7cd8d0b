use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REVALIDATE_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_ETSY_API_BASE_URL: &str = "https://openapi.etsy.com/v3/application";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRule {
    pub slug: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Lowercase substrings matched against tags and materials.
    #[serde(default)]
    pub match_tags: Vec<String>,
    #[serde(default)]
    pub match_sections: Vec<String>,
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtsyConfig {
    pub shop_url: String,
    pub api_base_url: String,
    pub shop_id: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EtsyConfig {
    fn default() -> Self {
        Self {
            shop_url: "https://www.etsy.com/shop/KindaSaltyStudio".to_owned(),
            api_base_url: DEFAULT_ETSY_API_BASE_URL.to_owned(),
            shop_id: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EtsyCredentials {
    pub api_key: String,
    pub shop_id: String,
}

impl EtsyConfig {
    pub fn credentials(&self) -> Option<EtsyCredentials> {
        let api_key = self.api_key.as_deref().filter(|v| !v.is_empty())?;
        let shop_id = self.shop_id.as_deref().filter(|v| !v.is_empty())?;
        Some(EtsyCredentials {
            api_key: api_key.to_owned(),
            shop_id: shop_id.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
    pub etsy: EtsyConfig,
    /// Evaluated in order; the first matching category wins.
    pub categories: Vec<CategoryRule>,
    pub revalidate_secs: u64,
    pub fallback_snapshot: PathBuf,
    pub contact_email: String,
    pub order_notify_email: String,
    pub email_from: String,

    #[serde(skip)]
    pub admin_token: Option<String>,
    #[serde(skip)]
    pub database_url: Option<String>,
    #[serde(skip)]
    pub resend_api_key: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Kinda Salty Studio".to_owned(),
            url: "https://kindasaltystudio.com".to_owned(),
            etsy: EtsyConfig::default(),
            categories: default_categories(),
            revalidate_secs: DEFAULT_REVALIDATE_SECS,
            fallback_snapshot: PathBuf::from("data/listings.json"),
            contact_email: "hello@kindasaltystudio.com".to_owned(),
            order_notify_email: "hello@kindasaltystudio.com".to_owned(),
            email_from: "Kinda Salty Studio <noreply@kindasaltystudio.com>".to_owned(),
            admin_token: None,
            database_url: None,
            resend_api_key: None,
        }
    }
}

fn default_categories() -> Vec<CategoryRule> {
    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    vec![
        CategoryRule {
            slug: "3d-prints".to_owned(),
            label: "3D Prints".to_owned(),
            description:
                "Custom 3D printed models, figurines, home décor, and functional prints.".to_owned(),
            match_tags: strings(&[
                "3d print",
                "3d printed",
                "3d printing",
                "pla",
                "resin print",
                "fdm",
            ]),
            match_sections: strings(&["3D Prints", "3D Printed"]),
            href: "/3d-prints".to_owned(),
        },
        CategoryRule {
            slug: "laser-engraving".to_owned(),
            label: "Laser Engraving".to_owned(),
            description:
                "Precision laser engraved signs, ornaments, coasters, and personalized gifts."
                    .to_owned(),
            match_tags: strings(&[
                "laser",
                "laser engraved",
                "laser cut",
                "engraved",
                "wood",
                "acrylic",
            ]),
            match_sections: strings(&["Laser Engraving", "Laser Engraved", "Laser Cut"]),
            href: "/laser-engraving".to_owned(),
        },
    ]
}

impl SiteConfig {
    /// Reads the optional YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read site config: {}", path.display()))?;
                serde_yaml::from_str::<SiteConfig>(&raw)
                    .with_context(|| format!("parse site config: {}", path.display()))?
            }
            None => SiteConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = var("ETSY_API_KEY") {
            self.etsy.api_key = Some(v);
        }
        if let Some(v) = var("ETSY_SHOP_ID") {
            self.etsy.shop_id = Some(v);
        }
        if let Some(v) = var("ETSY_API_BASE_URL") {
            self.etsy.api_base_url = v;
        }
        if let Some(v) = var("ADMIN_TOKEN") {
            self.admin_token = Some(v);
        }
        if let Some(v) = var("CONTACT_EMAIL") {
            self.contact_email = v;
        }
        if let Some(v) = var("ORDER_NOTIFY_EMAIL") {
            self.order_notify_email = v;
        }
        if let Some(v) = var("NEXT_PUBLIC_SITE_URL").or_else(|| var("SITE_URL")) {
            self.url = v;
        }
        if let Some(v) = var("POSTGRES_URL").or_else(|| var("DATABASE_URL")) {
            self.database_url = Some(v);
        }
        if let Some(v) = var("RESEND_API_KEY") {
            self.resend_api_key = Some(v);
        }
        if let Some(v) = var("STOREFRONT_FALLBACK_PATH") {
            self.fallback_snapshot = PathBuf::from(v);
        }
        if let Some(v) = var("STOREFRONT_REVALIDATE_SECS") {
            self.revalidate_secs = v
                .parse()
                .with_context(|| format!("invalid STOREFRONT_REVALIDATE_SECS={v:?}"))?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.url)
            .with_context(|| format!("site url must be absolute (with scheme): {:?}", self.url))?;
        let mut seen = std::collections::HashSet::new();
        for category in &self.categories {
            if category.slug.trim().is_empty() {
                anyhow::bail!("category slug must not be empty");
            }
            if category.slug == crate::formats::UNCATEGORIZED {
                anyhow::bail!("category slug {:?} is reserved", category.slug);
            }
            if !seen.insert(category.slug.as_str()) {
                anyhow::bail!("duplicate category slug: {}", category.slug);
            }
        }
        Ok(())
    }

    pub fn revalidate(&self) -> Duration {
        Duration::from_secs(self.revalidate_secs)
    }
}
