//! Rasterization of mutated documents
//!
//! The engine only needs a function from document bytes to image bytes.
//! With the `raster` feature (on by default) resvg provides one.

use thiserror::Error;

/// Errors raised while rasterizing a document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    #[error("cannot read document for rasterization: {0}")]
    Parse(String),

    #[error("cannot allocate a {width}x{height} image")]
    Allocation { width: u32, height: u32 },

    #[error("cannot encode image: {0}")]
    Encode(String),

    #[error("no rasterizer available: {0}")]
    Unavailable(String),
}

/// Converts a serialized document into raster image bytes
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, document: &[u8]) -> Result<Vec<u8>, RasterError>;
}

impl<F> Rasterizer for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, RasterError> + Send + Sync,
{
    fn rasterize(&self, document: &[u8]) -> Result<Vec<u8>, RasterError> {
        self(document)
    }
}

/// Stand-in used when the crate is built without a raster backend
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl Rasterizer for Unavailable {
    fn rasterize(&self, _document: &[u8]) -> Result<Vec<u8>, RasterError> {
        Err(RasterError::Unavailable(
            "built without the `raster` feature".to_string(),
        ))
    }
}

#[cfg(feature = "raster")]
pub use self::png::PngRasterizer;

#[cfg(feature = "raster")]
mod png {
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg::{Options, Tree};

    use super::{RasterError, Rasterizer};

    /// PNG output through resvg
    pub struct PngRasterizer {
        options: Options<'static>,
        scale: f32,
    }

    impl Default for PngRasterizer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl PngRasterizer {
        /// Rasterizer with the system fonts loaded
        pub fn new() -> Self {
            let mut options = Options::default();
            options.fontdb_mut().load_system_fonts();
            Self {
                options,
                scale: 1.0,
            }
        }

        /// Rasterizer without any fonts; text is not drawn
        pub fn without_fonts() -> Self {
            Self {
                options: Options::default(),
                scale: 1.0,
            }
        }

        /// Render at `scale` times the document's own size
        pub fn with_scale(mut self, scale: f32) -> Self {
            self.scale = scale;
            self
        }
    }

    impl Rasterizer for PngRasterizer {
        fn rasterize(&self, document: &[u8]) -> Result<Vec<u8>, RasterError> {
            let tree = Tree::from_data(document, &self.options)
                .map_err(|e| RasterError::Parse(e.to_string()))?;

            let size = tree.size().to_int_size();
            let width = (size.width() as f32 * self.scale).ceil() as u32;
            let height = (size.height() as f32 * self.scale).ceil() as u32;
            let mut pixmap =
                Pixmap::new(width, height).ok_or(RasterError::Allocation { width, height })?;

            resvg::render(
                &tree,
                Transform::from_scale(self.scale, self.scale),
                &mut pixmap.as_mut(),
            );
            pixmap
                .encode_png()
                .map_err(|e| RasterError::Encode(e.to_string()))
        }
    }
}
