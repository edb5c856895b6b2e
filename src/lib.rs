mod crawler;
mod frontier;
mod link_parser;
mod requester;
mod sitemap;
mod url_scope;

pub use crawler::*;
pub use frontier::*;
pub use link_parser::*;
pub use requester::*;
pub use sitemap::*;
pub use url_scope::*;

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = eyre::Result<T>;
