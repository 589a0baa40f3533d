//! The canned response text streamed to every client.

use std::num::NonZeroUsize;
use std::path::Path;

use crate::error::{Result, ServiceError};

/// Built-in response text, used when no payload file is configured.
pub const DEFAULT_TEXT: &str = concat!(
    "Renewable energy stands as the definitive solution to the global climate crisis, offering a ",
    "sustainable alternative to finite fossil fuels. By harnessing the infinite power of natural ",
    "resources like sunlight, wind, and water, we can significantly reduce carbon emissions and ",
    "protect our environment. Solar photovoltaic systems capture the sun's rays, providing versatile ",
    "energy for homes and industries. Wind turbines convert kinetic air energy into electricity, ",
    "powering cities without pollution. Hydroelectric dams utilize flowing water to generate reliable ",
    "power. Additionally, geothermal reservoirs and biomass provide diversity to the energy mix. ",
    "Transitioning to these green technologies is both an environmental necessity and an economic ",
    "catalyst, driving innovation and creating millions of jobs. To participate, individuals should ",
    "optimize efficiency, consider rooftop solar, and advocate for renewable policies. Governments ",
    "must invest in smart grids and battery storage to ensure stability. This shift is about securing ",
    "a livable future. By checking our reliance on carbon and embracing renewables, we build a legacy ",
    "of stewardship, ensuring a thriving planet for all future generations to come. Realizing this ",
    "vision requires immediate action to transform our energy landscape permanently."
);

/// Immutable, non-empty sequence of words.
///
/// Words are split on single spaces and keep any other whitespace (newlines,
/// repeated spaces) inside them, so [`Payload::text`] reproduces the source
/// text byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    words: Vec<String>,
}

impl Payload {
    /// Split `text` into words. Fails if it holds nothing but whitespace.
    pub fn new(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyPayload);
        }
        Ok(Self::split(text))
    }

    fn split(text: &str) -> Self {
        Self {
            words: text.split(' ').map(str::to_owned).collect(),
        }
    }

    /// Load a payload from a UTF-8 text file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ServiceError::Config(format!(
                "Failed to read payload file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::new(&text)
    }

    /// Load from `path` if given, otherwise fall back to the built-in text.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// The source text: words joined by the spaces they were split on.
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    /// Number of chunks the payload splits into at `chunk_size` words each.
    pub fn chunk_count(&self, chunk_size: NonZeroUsize) -> usize {
        self.words.len().div_ceil(chunk_size.get())
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::split(DEFAULT_TEXT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_default_payload_round_trips_text() {
        let payload = Payload::default();
        assert_eq!(payload.text(), DEFAULT_TEXT);
        assert!(payload.word_count() > 200);
    }

    #[test]
    fn test_text_is_preserved_exactly() {
        let source = "Line one.\nLine  two.\n";
        let payload = Payload::new(source).unwrap();
        assert_eq!(payload.words(), ["Line", "one.\nLine", "", "two.\n"]);
        assert_eq!(payload.text(), source);
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(matches!(Payload::new(""), Err(ServiceError::EmptyPayload)));
        assert!(matches!(
            Payload::new(" \n\t "),
            Err(ServiceError::EmptyPayload)
        ));
    }

    #[test]
    fn test_chunk_count_rounds_up() {
        let payload = Payload::new("a b c d e f g").unwrap();
        assert_eq!(payload.chunk_count(size(3)), 3);
        assert_eq!(payload.chunk_count(size(7)), 1);
        assert_eq!(payload.chunk_count(size(1)), 7);
        assert_eq!(payload.chunk_count(size(100)), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let source = "streamed from\na  file\n";
        file.write_all(source.as_bytes()).unwrap();

        let payload = Payload::load(Some(file.path())).unwrap();
        assert_eq!(payload.text(), source);
        assert_eq!(payload.word_count(), 4);
    }

    #[test]
    fn test_load_without_path_uses_builtin() {
        let payload = Payload::load(None::<&Path>).unwrap();
        assert_eq!(payload, Payload::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Payload::from_file("/nonexistent/payload.txt").unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
        assert!(err.to_string().contains("/nonexistent/payload.txt"));
    }
}
