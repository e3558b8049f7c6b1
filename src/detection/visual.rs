//! Optional classification of image elements.
//!
//! Every image is redacted whether or not a classifier is configured. A
//! classifier only decides the label drawn on the box and shown in the
//! overlay; images it cannot classify keep the generic label.

use crate::domain::DocumentElement;
use crate::error::RedactorResult;
use tracing::{debug, warn};

/// Assigns a class such as "Full Face Photo" to an image element.
pub trait ImageClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Class of `element`, an image on a page of `pdf`; `None` when unknown.
    fn classify(&self, pdf: &[u8], element: &DocumentElement) -> RedactorResult<Option<String>>;
}

/// Sets `label` on every image the classifier recognises.
///
/// Classifier errors are logged and leave the image unlabelled.
pub fn label_images(classifier: &dyn ImageClassifier, pdf: &[u8], images: &mut [DocumentElement]) -> usize {
    let mut labelled = 0;
    for image in images.iter_mut() {
        match classifier.classify(pdf, image) {
            Ok(Some(label)) if !label.trim().is_empty() => {
                image.label = Some(label.trim().to_string());
                labelled += 1;
            }
            Ok(_) => {}
            Err(e) => warn!(
                classifier = classifier.name(),
                page = image.page_index + 1,
                error = %e,
                "image classification failed"
            ),
        }
    }
    debug!(labelled, images = images.len(), "classified images");
    labelled
}
