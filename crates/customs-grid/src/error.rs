#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} has no pages")]
    NoPages(String),

    #[error("None of the requested pages exist (document has {0} pages)")]
    NoPagesSelected(usize),

    #[error("No OCR backend available: {0}")]
    NoOcrBackend(String),

    #[error("Worker failed: {0}")]
    Worker(String),
}
