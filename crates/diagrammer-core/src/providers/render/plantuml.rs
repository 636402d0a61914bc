use super::{fetch_image, BackendError, RenderBackend};
use crate::model::{LayoutEngine, OutputFormat};
use async_trait::async_trait;
use base64::alphabet::Alphabet;
use base64::engine::general_purpose::NO_PAD;
use base64::engine::GeneralPurpose;
use base64::Engine as _;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;
use std::time::Duration;

// PlantUML's URL alphabet: standard base64 bit grouping over 0-9A-Za-z-_.
const PLANTUML_ALPHABET: Alphabet =
    match Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_") {
        Ok(a) => a,
        Err(_) => panic!("invalid plantuml alphabet"),
    };

const PLANTUML_ENGINE: GeneralPurpose = GeneralPurpose::new(&PLANTUML_ALPHABET, NO_PAD);

/// Renders WBS/UML markup through a PlantUML server.
pub struct PlantUmlBackend {
    pub server_url: String,
    pub timeout: Duration,
    pub client: reqwest::Client,
}

impl PlantUmlBackend {
    pub fn new(server_url: String, timeout: Duration) -> Self {
        Self {
            server_url,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn url_for(&self, markup: &str, format: OutputFormat) -> Result<String, BackendError> {
        let encoded = encode_plantuml(markup)
            .map_err(|e| BackendError::BadInput(format!("failed to encode markup: {e}")))?;
        Ok(format!(
            "{}/{}/{}",
            self.server_url.trim_end_matches('/'),
            format.as_str(),
            encoded
        ))
    }
}

/// Raw DEFLATE followed by PlantUML's base64 variant.
pub fn encode_plantuml(text: &str) -> std::io::Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(PLANTUML_ENGINE.encode(compressed))
}

#[async_trait]
impl RenderBackend for PlantUmlBackend {
    async fn render(
        &self,
        markup: &str,
        format: OutputFormat,
        _engine: LayoutEngine,
    ) -> Result<Vec<u8>, BackendError> {
        let url = self.url_for(markup, format)?;
        tracing::debug!(event = "render.plantuml.request", server = %self.server_url, url_len = url.len());
        fetch_image(&self.client, &url, self.timeout).await
    }

    fn name(&self) -> &'static str {
        "plantuml"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    const WBS: &str = "@startwbs\n* Project\n** Design\n** Build\n@endwbs";

    #[test]
    fn encoding_uses_url_safe_alphabet_and_inflates_back() {
        let encoded = encode_plantuml(WBS).unwrap();
        assert!(encoded
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));

        let compressed = PLANTUML_ENGINE.decode(&encoded).unwrap();
        let mut out = String::new();
        DeflateDecoder::new(&compressed[..])
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, WBS);
    }

    #[test]
    fn url_contains_format_segment() {
        let backend = PlantUmlBackend::new(
            "http://plantuml.local/plantuml/".into(),
            Duration::from_secs(1),
        );
        let url = backend.url_for(WBS, OutputFormat::Png).unwrap();
        assert!(url.starts_with("http://plantuml.local/plantuml/png/"), "{url}");
    }
}
