// Artifact bundles: `<artifacts>/<run-id>/<name>/` holding the matched files
// and a `manifest.json` describing them.

pub mod artifact_store;
pub mod manifest;
pub mod publish_artifact;
