use maplit::hashmap;
use std::fmt;
use strfmt::strfmt;

use crate::error::{Error, Result};
use crate::tile::Tile;

/// A tile URL template with `{x}`, `{y}`, `{z}` and optionally `{s}`
/// placeholders.
#[derive(Clone, PartialEq)]
pub struct UrlFormat {
    format_str: String,
    subdomains: Vec<String>,
}

impl UrlFormat {
    /// Checks the template once so formatting individual tiles cannot fail
    /// later on.
    pub fn new(format_str: String, subdomains: Vec<String>) -> Result<Self> {
        let template = format_str.clone();
        let invalid = |reason: &str| Error::InvalidUrlTemplate {
            template: template.clone(),
            reason: reason.to_owned(),
        };

        for placeholder in &["{x}", "{y}", "{z}"] {
            if !format_str.contains(placeholder) {
                return Err(invalid(&format!("missing {}", placeholder)));
            }
        }

        if format_str.contains("{s}") && subdomains.is_empty() {
            return Err(invalid("uses {s} but no subdomains are configured"));
        }

        let url = Self {
            format_str,
            subdomains,
        };
        url.render(&Tile::new(0, 0, 0), "")
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(url)
    }

    /// Formats the URL of `tile`, picking a random subdomain for `{s}`.
    pub fn tile_url(&self, tile: &Tile) -> String {
        let subdomain = match self.subdomains.len() {
            0 => "",
            len => self.subdomains[rand::random_range(0..len)].as_str(),
        };

        // validated in `new`
        self.render(tile, subdomain).unwrap_or_default()
    }

    fn render(&self, tile: &Tile, subdomain: &str) -> std::result::Result<String, strfmt::FmtError> {
        let vars = hashmap! {
            "s".to_owned() => subdomain.to_owned(),
            "x".to_owned() => tile.x.to_string(),
            "y".to_owned() => tile.y.to_string(),
            "z".to_owned() => tile.z.to_string(),
        };

        strfmt(&self.format_str, &vars)
    }
}

impl fmt::Debug for UrlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlFormat")
            .field("format_str", &self.format_str)
            .field("subdomains", &self.subdomains)
            .finish()
    }
}
