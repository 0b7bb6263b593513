pub mod engine;
pub mod pool;

pub use engine::{default_factory, RecognizerFactory, TextRecognizer};
pub use pool::{ProgressObserver, WorkItem, WorkerPool, MAX_WORKERS};
