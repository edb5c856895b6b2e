use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use eyre::WrapErr;

use crate::{CrawlResult, Result};

pub const SUMMARY_FILE: &str = "summary.csv";
const SUMMARY_HEADER: [&str; 4] = ["site_url", "elapsed_seconds", "page_count", "file_name"];

/// Writes finished crawls to `dir`: one `<host>.txt` per site listing its
/// pages, plus a row per crawl appended to `summary.csv`.
#[derive(Debug, Clone)]
pub struct SiteMapWriter {
    dir: PathBuf,
}

impl SiteMapWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the page list that was written.
    pub fn save(&self, result: &CrawlResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .wrap_err_with(|| format!("failed to create output directory {}", self.dir.display()))?;

        let file_name = site_file_name(result);
        let path = self.dir.join(&file_name);
        self.write_pages(&path, result)?;
        self.append_summary(result, &file_name)?;

        log::info!(
            "Site map for {} saved to {} ({} pages)",
            result.target.seed(),
            path.display(),
            result.page_count()
        );
        Ok(path)
    }

    fn write_pages(&self, path: &Path, result: &CrawlResult) -> Result<()> {
        let file = File::create(path).wrap_err_with(|| format!("failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        for url in result.urls() {
            writeln!(out, "{url}")?;
        }
        out.flush()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn append_summary(&self, result: &CrawlResult, file_name: &str) -> Result<()> {
        let path = self.dir.join(SUMMARY_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open {}", path.display()))?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = csv::Writer::from_writer(file);
        if is_empty {
            writer.write_record(SUMMARY_HEADER)?;
        }
        let elapsed = format!("{:.2}", result.elapsed.as_secs_f64());
        let page_count = result.page_count().to_string();
        writer.write_record([
            result.target.seed().as_str(),
            elapsed.as_str(),
            page_count.as_str(),
            file_name,
        ])?;
        writer
            .flush()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// `example.test.txt`, or `127.0.0.1_8080.txt` when the seed has a port.
fn site_file_name(result: &CrawlResult) -> String {
    let seed = result.target.seed();
    let host = seed.host_str().unwrap_or("site");
    match seed.port() {
        Some(port) => format!("{host}_{port}.txt"),
        None => format!("{host}.txt"),
    }
}
