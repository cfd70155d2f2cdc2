//! Test fixtures.

use std::net::TcpListener;
use tagindex_core::Digest;

/// Tag used by the replication scenarios.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub const TAG: &str = "uber-usi/labrat";

#[allow(dead_code)]
pub const REMOTE: &str = "remote-build-index";

#[allow(dead_code)]
pub const LOCAL_REPLICA: &str = "local-build-index";

#[allow(dead_code)]
pub const ORIGIN: &str = "some-dns-record";

/// Deterministic digest derived from a seed string.
#[allow(dead_code)]
pub fn digest(seed: &str) -> Digest {
    Digest::compute(seed.as_bytes())
}

/// Three dependency digests, in a fixed order.
#[allow(dead_code)]
pub fn dependencies() -> Vec<Digest> {
    vec![digest("layer-c"), digest("layer-a"), digest("layer-b")]
}

/// Percent-encode a tag for use as a single path segment.
#[allow(dead_code)]
pub fn encode_tag(tag: &str) -> String {
    tag.replace('%', "%25").replace('/', "%2F")
}

#[allow(dead_code)]
pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}
