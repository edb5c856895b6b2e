use std::fmt;

use eyre::WrapErr;
use url::Url;

use crate::Result;

/// The seed of one crawl: where it starts, which scheme and host it is
/// confined to and how deep it may go. The seed itself sits at depth 1.
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    seed: Url,
    base: Url,
    max_depth: usize,
}

impl CrawlTarget {
    pub fn new(seed: &str, max_depth: usize) -> Result<Self> {
        let mut seed = Url::parse(seed).wrap_err_with(|| format!("invalid seed URL {seed:?}"))?;
        if !is_web_scheme(&seed) {
            eyre::bail!(
                "seed URL {} uses unsupported scheme {:?}, expected http or https",
                seed,
                seed.scheme()
            );
        }
        if seed.host_str().is_none() {
            eyre::bail!("seed URL {} has no host", seed);
        }
        seed.set_fragment(None);

        let mut base = seed.clone();
        base.set_path("/");
        base.set_query(None);
        base.set_port(None)
            .map_err(|_| eyre::eyre!("cannot derive base URL from {seed}"))?;

        Ok(Self {
            seed,
            base,
            max_depth,
        })
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    /// Scheme and host of the seed, e.g. `https://example.test/`.
    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn in_scope(&self, url: &Url) -> bool {
        in_scope(url, &self.base)
    }
}

impl fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (max depth {})", self.seed, self.max_depth)
    }
}

/// Joins `href` onto the page URL. Returns `None` for anything that does not
/// end up as an http(s) URL, such as `mailto:` or `javascript:` links.
/// Fragments are always dropped so `/a` and `/a#top` name the same page.
pub fn resolve(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !is_web_scheme(&url) || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// True when `url` has exactly the scheme and host of `base`. Ports are not
/// compared.
pub fn in_scope(url: &Url, base: &Url) -> bool {
    url.scheme() == base.scheme() && url.host().is_some() && url.host() == base.host()
}

fn is_web_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
