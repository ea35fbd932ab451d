mod csv;
#[cfg(feature = "pdf")]
mod pdf;

pub use self::csv::CsvLoader;
#[cfg(feature = "pdf")]
pub use self::pdf::PdfLoader;
