//! Essay text acquisition.
//!
//! Input channels are a tagged variant consumed by a single `acquire`
//! operation, not string-dispatched UI branches. File inputs are sniffed by
//! content, so a photographed page and a PDF both work from the same `--file`
//! flag. OCR and PDF extraction are delegated to external CLI tools
//! (`tesseract`, `pdftotext`, `pdftoppm`), which must be on `PATH` for those
//! channels.

use std::process::ExitStatus;

use tokio::{io::AsyncReadExt as _, process::Command};

use crate::prelude::*;

/// Where the essay text comes from.
#[derive(Debug)]
pub enum EssaySource {
    /// Text supplied directly on the command line.
    Inline(String),

    /// Text read from standard input.
    Stdin,

    /// A plain-text file.
    TextFile(PathBuf),

    /// An image of a written page, OCRed with tesseract.
    Image(PathBuf),

    /// A PDF. Searchable text is extracted directly; scanned PDFs are
    /// rasterized and OCRed page by page.
    Pdf(PathBuf),
}

impl EssaySource {
    /// Choose a source from the command-line inputs, sniffing file content to
    /// pick the right channel. With neither text nor a file, we read stdin.
    pub fn detect(text: Option<String>, file: Option<PathBuf>) -> Result<Self> {
        if let Some(text) = text {
            return Ok(Self::Inline(text));
        }
        let Some(path) = file else {
            return Ok(Self::Stdin);
        };
        let kind = infer::get_from_path(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        match kind {
            Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {
                Ok(Self::Image(path))
            }
            Some(kind) if kind.mime_type() == "application/pdf" => Ok(Self::Pdf(path)),
            _ => Ok(Self::TextFile(path)),
        }
    }

    /// Get the essay text from this source.
    ///
    /// May legitimately return blank text (an empty file, an OCR run that
    /// found nothing); the caller treats that as "no input provided" when it
    /// constructs the evaluation request.
    #[instrument(level = "debug", skip_all, fields(source = ?self))]
    pub async fn acquire(&self) -> Result<String> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::Stdin => {
                let mut buffer = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buffer)
                    .await
                    .context("cannot read essay from stdin")?;
                Ok(buffer)
            }
            Self::TextFile(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("cannot read {}", path.display())),
            Self::Image(path) => ocr_image(path).await,
            Self::Pdf(path) => extract_pdf(path).await,
        }
    }
}

/// OCR a single image with the `tesseract` CLI.
async fn ocr_image(path: &Path) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .output()
        .await
        .context("cannot run tesseract")?;
    check_for_command_failure("tesseract", output.status)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract text from a PDF, rasterizing and OCRing when it has no searchable
/// text.
async fn extract_pdf(path: &Path) -> Result<String> {
    let tmpdir = tempfile::TempDir::with_prefix("essay-grader")?;
    let output_path = tmpdir.path().join("output.txt");
    let status = Command::new("pdftotext")
        .arg("-layout")
        .arg(path)
        .arg(&output_path)
        .status()
        .await
        .context("cannot run pdftotext")?;
    check_for_command_failure("pdftotext", status)?;
    let text = tokio::fs::read_to_string(&output_path)
        .await
        .context("cannot read pdftotext output file")?;
    if !text.trim().is_empty() {
        return Ok(text);
    }

    // A scan, most likely. Rasterize the pages and OCR each one.
    debug!("no searchable text in {}; rasterizing for OCR", path.display());
    let page_prefix = tmpdir.path().join("page");
    let status = Command::new("pdftoppm")
        .arg("-r")
        .arg("300")
        .arg("-png")
        .arg(path)
        .arg(&page_prefix)
        .status()
        .await
        .context("cannot run pdftoppm")?;
    check_for_command_failure("pdftoppm", status)?;

    let mut pages: Vec<PathBuf> = std::fs::read_dir(tmpdir.path())
        .context("cannot list rasterized pages")?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .collect();
    pages.sort();

    let mut text = String::new();
    for page in &pages {
        text.push_str(&ocr_image(page).await?);
        text.push('\n');
    }
    Ok(text)
}

/// Turn a non-zero exit status into an error.
fn check_for_command_failure(name: &str, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("{name} failed with {status}"))
    }
}
