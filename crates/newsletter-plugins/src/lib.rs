// newsletter-plugins: artifact publishing for the newsletter runner.
// Files produced by a run are bundled into a local, retention-managed store.

pub mod artifact;

// Re-exports for convenient access
pub use artifact::artifact_store::{ArtifactStore, StoredArtifact};
pub use artifact::manifest::{ArtifactFile, ArtifactManifest};
pub use artifact::publish_artifact::{ArtifactPublisher, PublishOutcome};
