// Container and image labels
/// Label given to all containers and images created by the app
pub const APP_LABEL: &str = "secondtry-builder";
/// Image label holding the ID of the build that produced the image
pub const BUILD_LABEL: &str = "secondtry-build";
/// Container label holding the ID of the launch that created the container
pub const LAUNCH_LABEL: &str = "secondtry-launch";
/// Image label holding the digest of the dependency manifest
pub const MANIFEST_DIGEST_LABEL: &str = "secondtry-manifest-digest";
/// Image label holding the digest of the build context
pub const CONTEXT_DIGEST_LABEL: &str = "secondtry-context-digest";

// Build context constants
/// Name of the rendered recipe inside the build context archive
pub const RECIPE_FILENAME: &str = ".secondtry-builder.Dockerfile";
/// Ignore file written next to the recipe. It lists only the recipe and itself, so the
/// engine leaves both out of `COPY` while copying the rest of the context.
pub const IGNORE_FILENAME: &str = ".dockerignore";
/// Largest build context accepted, in bytes
pub const MAX_CONTEXT_BYTES: u64 = 512 * 1024 * 1024;

/// Buffer size of the event channels handed back to API callers
pub const CHANNEL_BUFFER_SIZE: usize = 1024;
