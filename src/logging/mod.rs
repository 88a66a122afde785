// Logging setup and privacy helpers
//
// User text never goes into logs; call sites log `fingerprint(text)` and
// lengths instead.

use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug` picks the default level.
pub fn init_tracing(debug: bool) {
    let default = if debug {
        "subjectchat=debug,tower_http=debug"
    } else {
        "subjectchat=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, embedding) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Short SHA-256 fingerprint of user text, safe to log
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}
