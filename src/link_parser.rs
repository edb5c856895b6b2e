use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::{url_scope, Result};

/// Pulls in-scope anchor targets out of a page.
///
/// The html5ever tree builder behind `scraper` recovers from broken markup
/// instead of failing, so extraction always yields whatever anchors it could
/// make sense of.
pub struct LinkParser {
    anchor: Selector,
    noscript: Selector,
}

impl LinkParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            anchor: selector("a[href]")?,
            noscript: selector("noscript")?,
        })
    }

    /// Returns the distinct links of `html`, resolved against `page_url` and
    /// restricted to the origin of `base`.
    pub fn extract_links(&self, html: &str, page_url: &Url, base: &Url) -> HashSet<Url> {
        let mut documents = Vec::new();
        let document = Html::parse_document(html);

        // Markup inside <noscript> is raw text to the parser.
        for noscript in document.select(&self.noscript) {
            let document = Html::parse_document(&noscript.text().collect::<Vec<_>>().join(""));
            documents.push(document);
        }
        documents.push(document);

        let mut urls = HashSet::new();
        for document in documents {
            for link in document.select(&self.anchor) {
                let href = match link.value().attr("href") {
                    Some(href) => href,
                    None => continue,
                };
                match url_scope::resolve(page_url, href) {
                    Some(url) if url_scope::in_scope(&url, base) => {
                        urls.insert(url);
                    }
                    Some(url) => log::trace!("Skipping out of scope link {}", url),
                    None => log::trace!("Skipping unresolvable href {:?} on {}", href, page_url),
                }
            }
        }
        urls
    }
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| eyre::eyre!("invalid selector {css:?}: {e:?}"))
}
