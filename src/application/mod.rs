pub mod download_invoker;

pub use download_invoker::{DownloadEvent, DownloadInvoker};
