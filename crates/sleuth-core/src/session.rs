//! Image sessions: the boundary between raw files and analysis runs.
//!
//! A session decodes an image once, attaches whatever metadata can be
//! extracted, and keeps the registry of analysers with their enabled
//! flags. Decoding failures abort session creation; metadata failures
//! only cost the metadata.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{ImageDecoder, ImageFormat, ImageReader};
use log::{debug, warn};

use crate::analyser::{AnalyserHandle, display_name};
use crate::orchestrator::{
    AnalysisReport, CancellationToken, Observer, Orchestrator, OrchestratorConfig, RunError,
    RunHandle,
};
use crate::types::{ImageMatrix, Metadata, RgbaImage};

/// Errors that prevent a session from being created.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// No compiled-in decoder recognises the data.
    #[error("no decoder available for this image format")]
    NoDecoderAvailable,

    /// The format was recognised but the data is corrupt.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The decoded raster cannot be analysed.
    #[error("malformed image: {0}")]
    MalformedImage(String),

    /// The image file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Errors raised while extracting metadata. Never fatal to a session.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The container format is not one the extractor understands.
    #[error("unrecognised container format")]
    UnrecognisedFormat,

    /// The container could be identified but its headers are unreadable.
    #[error("unreadable container headers: {0}")]
    Unreadable(String),
}

/// Pulls metadata groups out of an encoded image.
pub trait MetadataExtractor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`MetadataError`] when nothing can be extracted.
    fn extract(&self, bytes: &[u8]) -> Result<Metadata, MetadataError>;
}

/// Reports the container's own description of the image under the
/// [`FILE_GROUP`](Self::FILE_GROUP) group: format, width, height and
/// colour type as stored in the container.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerMetadata;

impl ContainerMetadata {
    /// Name of the metadata group this extractor fills.
    pub const FILE_GROUP: &'static str = "File";
}

impl MetadataExtractor for ContainerMetadata {
    fn extract(&self, bytes: &[u8]) -> Result<Metadata, MetadataError> {
        let format = image::guess_format(bytes).map_err(|_| MetadataError::UnrecognisedFormat)?;
        // Only the headers are read; pixel data stays untouched.
        let decoder = ImageReader::with_format(Cursor::new(bytes), format)
            .into_decoder()
            .map_err(|err| MetadataError::Unreadable(err.to_string()))?;
        let (width, height) = decoder.dimensions();

        let tags = [
            ("Format", format_name(format)),
            ("Width", width.to_string()),
            ("Height", height.to_string()),
            ("Color Type", format!("{:?}", decoder.color_type())),
        ];
        let mut metadata = Metadata::new();
        metadata.insert(
            Self::FILE_GROUP.to_string(),
            tags.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        );
        Ok(metadata)
    }
}

fn format_name(format: ImageFormat) -> String {
    format!("{format:?}").to_uppercase()
}

/// Decode raw image bytes to straight RGBA8.
///
/// Supports whatever the `image` crate is compiled with (PNG, JPEG, BMP,
/// WebP).
///
/// # Errors
///
/// Returns [`SessionError::EmptyInput`] if `bytes` is empty,
/// [`SessionError::NoDecoderAvailable`] if the format is unknown or not
/// compiled in, and [`SessionError::Decode`] if the data is corrupt.
#[must_use = "returns the decoded raster"]
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, SessionError> {
    if bytes.is_empty() {
        return Err(SessionError::EmptyInput);
    }
    let format = image::guess_format(bytes).map_err(|_| SessionError::NoDecoderAvailable)?;
    match image::load_from_memory_with_format(bytes, format) {
        Ok(img) => Ok(img.to_rgba8()),
        Err(image::ImageError::Unsupported(_)) => Err(SessionError::NoDecoderAvailable),
        Err(err) => Err(SessionError::Decode(err)),
    }
}

/// One decoded image plus the analysers that may run on it.
pub struct ImageSession {
    name: String,
    image: Arc<ImageMatrix>,
    analysers: Vec<(AnalyserHandle, bool)>,
}

impl ImageSession {
    /// Read, decode and describe an image file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file cannot be read, or any
    /// error of [`from_bytes`](Self::from_bytes).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        Self::open_with(path, &ContainerMetadata)
    }

    /// [`open`](Self::open) with a custom metadata extractor.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_with(
        path: impl AsRef<Path>,
        extractor: &dyn MetadataExtractor,
    ) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| SessionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self::from_bytes(name, &bytes, extractor)
    }

    /// Decode an in-memory image.
    ///
    /// Metadata extraction failures are logged and leave the metadata
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns the [`decode_image`] errors, or
    /// [`SessionError::MalformedImage`] for a zero-sized raster.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: &[u8],
        extractor: &dyn MetadataExtractor,
    ) -> Result<Self, SessionError> {
        let name = name.into();
        let pixels = decode_image(bytes)?;
        let metadata = extractor.extract(bytes).unwrap_or_else(|err| {
            warn!("metadata extraction failed for {name}: {err}");
            Metadata::new()
        });
        debug!(
            "opened {name}: {}x{}, {} metadata groups",
            pixels.width(),
            pixels.height(),
            metadata.len()
        );
        Ok(Self::from_matrix(name, ImageMatrix::new(pixels, metadata)?))
    }

    /// Wrap an already decoded matrix.
    #[must_use]
    pub fn from_matrix(name: impl Into<String>, image: ImageMatrix) -> Self {
        Self {
            name: name.into(),
            image: Arc::new(image),
            analysers: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn image(&self) -> &Arc<ImageMatrix> {
        &self.image
    }

    /// Add an analyser, enabled.
    pub fn register(&mut self, analyser: AnalyserHandle) {
        self.analysers.push((analyser, true));
    }

    /// Registered analysers with their enabled flags, in registration
    /// order.
    pub fn analysers(&self) -> impl Iterator<Item = (&AnalyserHandle, bool)> {
        self.analysers.iter().map(|(a, enabled)| (a, *enabled))
    }

    /// Enable or disable a registered analyser. Returns `false` if it is
    /// not registered.
    pub fn set_enabled(&mut self, analyser: &AnalyserHandle, enabled: bool) -> bool {
        match self.analysers.iter_mut().find(|(a, _)| Arc::ptr_eq(a, analyser)) {
            Some((_, flag)) => {
                *flag = enabled;
                true
            }
            None => false,
        }
    }

    /// Enable exactly the analysers whose display name matches one of
    /// `names` (case-insensitive); disable the rest. Returns how many
    /// ended up enabled.
    pub fn enable_only(&mut self, names: &[String]) -> usize {
        let mut count = 0;
        for (analyser, flag) in &mut self.analysers {
            let name = display_name(analyser.as_ref());
            *flag = names.iter().any(|n| n.eq_ignore_ascii_case(name));
            count += usize::from(*flag);
        }
        count
    }

    /// Enabled analysers in registration order.
    #[must_use]
    pub fn enabled_analysers(&self) -> Vec<AnalyserHandle> {
        self.analysers
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(a, _)| Arc::clone(a))
            .collect()
    }

    /// Run the enabled analysers on a dedicated background thread.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Spawn`] if the worker cannot be started.
    pub fn analyse(&self, config: OrchestratorConfig) -> Result<RunHandle, RunError> {
        Orchestrator::new(config).spawn(
            format!("Analyser thread for image \"{}\"", self.name),
            Arc::clone(&self.image),
            self.enabled_analysers(),
        )
    }

    /// Run the enabled analysers on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Cancelled`] if `cancel` fires.
    pub fn analyse_blocking(
        &self,
        config: OrchestratorConfig,
        observer: &dyn Observer,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, RunError> {
        Orchestrator::new(config).run(
            Arc::clone(&self.image),
            self.enabled_analysers(),
            observer,
            cancel,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::analyser::{Analyser, AnalyserError, Reporter};
    use crate::finding::Finding;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([(x * 10) as u8, (y * 10) as u8, 0, 255])
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    struct Named(&'static str);

    impl Analyser for Named {
        fn name(&self) -> Option<&str> {
            Some(self.0)
        }

        fn analyse(
            &self,
            _image: &ImageMatrix,
            _reporter: &Reporter<'_>,
        ) -> Result<Vec<Finding>, AnalyserError> {
            Ok(Vec::new())
        }
    }

    struct Failing;

    impl MetadataExtractor for Failing {
        fn extract(&self, _bytes: &[u8]) -> Result<Metadata, MetadataError> {
            Err(MetadataError::Unreadable("truncated".to_string()))
        }
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode_image(&[]), Err(SessionError::EmptyInput)));
    }

    #[test]
    fn unknown_format_has_no_decoder() {
        let result = decode_image(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert!(matches!(result, Err(SessionError::NoDecoderAvailable)));
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let bytes = png_bytes(4, 4);
        let result = decode_image(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(SessionError::Decode(_))));
    }

    #[test]
    fn png_decodes_to_rgba() {
        let img = decode_image(&png_bytes(3, 2)).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(1, 1).0, [10, 10, 0, 255]);
    }

    #[test]
    fn container_metadata_reports_file_group() {
        let metadata = ContainerMetadata.extract(&png_bytes(5, 7)).unwrap();
        let file = &metadata[ContainerMetadata::FILE_GROUP];
        assert_eq!(file["Format"], "PNG");
        assert_eq!(file["Width"], "5");
        assert_eq!(file["Height"], "7");
        assert_eq!(file["Color Type"], "Rgba8");
    }

    #[test]
    fn container_metadata_reads_headers_only() {
        // Without IEND and the IDAT checksum the pixels no longer decode.
        let bytes = png_bytes(5, 7);
        let headers = &bytes[..bytes.len() - 16];
        assert!(decode_image(headers).is_err());

        let metadata = ContainerMetadata.extract(headers).unwrap();
        let file = &metadata[ContainerMetadata::FILE_GROUP];
        assert_eq!(file["Width"], "5");
        assert_eq!(file["Height"], "7");
    }

    #[test]
    fn metadata_failure_is_not_fatal() {
        let session = ImageSession::from_bytes("x.png", &png_bytes(2, 2), &Failing).unwrap();
        assert!(session.image().metadata().is_empty());
        assert_eq!(session.name(), "x.png");
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let result = ImageSession::open("/nonexistent/definitely/missing.png");
        assert!(matches!(result, Err(SessionError::Io { .. })));
    }

    #[test]
    fn registry_keeps_order_and_flags() {
        let mut session =
            ImageSession::from_bytes("x.png", &png_bytes(2, 2), &ContainerMetadata).unwrap();
        let a: AnalyserHandle = Arc::new(Named("Alpha"));
        let b: AnalyserHandle = Arc::new(Named("Beta"));
        let c: AnalyserHandle = Arc::new(Named("Gamma"));
        session.register(Arc::clone(&a));
        session.register(Arc::clone(&b));
        session.register(Arc::clone(&c));

        assert!(session.set_enabled(&b, false));
        let enabled: Vec<_> = session
            .enabled_analysers()
            .iter()
            .map(|a| a.name().unwrap().to_string())
            .collect();
        assert_eq!(enabled, ["Alpha", "Gamma"]);

        let stranger: AnalyserHandle = Arc::new(Named("Alpha"));
        assert!(!session.set_enabled(&stranger, false));
    }

    #[test]
    fn enable_only_matches_names_case_insensitively() {
        let mut session =
            ImageSession::from_bytes("x.png", &png_bytes(2, 2), &ContainerMetadata).unwrap();
        session.register(Arc::new(Named("Alpha")));
        session.register(Arc::new(Named("Beta")));
        assert_eq!(session.enable_only(&["beta".to_string()]), 1);
        assert_eq!(session.enabled_analysers()[0].name(), Some("Beta"));
    }
}
