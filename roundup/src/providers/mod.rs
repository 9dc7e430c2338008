//! External collaborators: search, text generation, images, speech and
//! rendering.

mod models;
mod protocols;

pub use models::{SlideKind, SlideSpec, Snippet, SpeechClip, VideoSegment};
pub use protocols::{
    ImageProvider, SearchProvider, SlideRenderer, SpeechSynthesizer, TextGenerator, VideoEncoder,
};

pub use crate::media::ImageValidator;

use std::sync::Arc;

/// The full set of providers a run needs.
#[derive(Clone)]
pub struct Providers {
    /// Web search.
    pub search: Arc<dyn SearchProvider>,
    /// Text generation.
    pub text: Arc<dyn TextGenerator>,
    /// Image candidates.
    pub images: Arc<dyn ImageProvider>,
    /// Image acceptance check.
    pub validator: Arc<dyn ImageValidator>,
    /// Text to speech.
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// Slide rendering.
    pub slides: Arc<dyn SlideRenderer>,
    /// Audio stitching and video encoding.
    pub video: Arc<dyn VideoEncoder>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
