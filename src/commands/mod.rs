mod export;
mod pages;

pub use export::run_export;
pub use pages::run_pages;
